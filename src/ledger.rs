// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core - Economy Ledger

use log::{info, warn};
use rust_decimal::Decimal;

use crate::adapter::{from_decimal, to_decimal};
use crate::config::{ScorePoints, UpkeepScaling};
use crate::events::GameOverReason;
use crate::types::{Destination, FailureCounts, Outcome, Score, TrafficRequest, TrafficType};

pub const MAX_REPUTATION: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("insufficient funds: need {needed}, have {available}")]
pub struct InsufficientFunds {
    pub needed: f64,
    pub available: f64,
}

/// Global upkeep multiplier: a linear ramp from base to max over the scale
/// time, times any active cost-spike factor.
pub fn upkeep_multiplier(elapsed: f64, scaling: &UpkeepScaling, cost_multiplier: f64) -> f64 {
    let ramp = if scaling.enabled && scaling.scale_time > 0.0 {
        let progress = (elapsed / scaling.scale_time).clamp(0.0, 1.0);
        scaling.base_multiplier + (scaling.max_multiplier - scaling.base_multiplier) * progress
    } else {
        1.0
    };
    ramp * cost_multiplier
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomyLedger {
    money: Decimal,
    pub reputation: f64,
    pub score: Score,
    pub failures: FailureCounts,
    pub requests_processed: u64,
    game_over: Option<GameOverReason>,
}

impl EconomyLedger {
    pub fn new(money: f64) -> Self {
        Self {
            money: to_decimal(money),
            reputation: MAX_REPUTATION,
            score: Score::default(),
            failures: FailureCounts::default(),
            requests_processed: 0,
            game_over: None,
        }
    }

    pub fn money(&self) -> f64 {
        from_decimal(self.money)
    }

    pub fn money_exact(&self) -> Decimal {
        self.money
    }

    pub fn set_money(&mut self, amount: f64) {
        self.money = to_decimal(amount);
    }

    pub fn credit(&mut self, amount: Decimal) {
        self.money += amount;
    }

    /// Deduct `cost` or reject without touching the balance.
    pub fn try_spend(&mut self, cost: Decimal) -> Result<(), InsufficientFunds> {
        if self.money < cost {
            return Err(InsufficientFunds { needed: from_decimal(cost), available: self.money() });
        }
        self.money -= cost;
        Ok(())
    }

    /// Charge `per_second * dt * multiplier` of upkeep. Money may go negative.
    pub fn charge_upkeep(&mut self, per_second: f64, dt: f64, multiplier: f64) {
        self.money -= to_decimal(per_second * dt * multiplier);
    }

    fn adjust_reputation(&mut self, delta: f64) {
        self.reputation = (self.reputation + delta).min(MAX_REPUTATION);
    }

    /// Score one terminal outcome.
    pub fn record(&mut self, request: &TrafficRequest, outcome: Outcome, points: &ScorePoints) {
        match outcome {
            Outcome::MaliciousBlocked => {
                self.score.malicious_blocked += points.malicious_blocked_score;
                self.score.total += points.malicious_blocked_score;
            }
            Outcome::MaliciousPassed => {
                self.adjust_reputation(points.malicious_passed_reputation);
                self.failures.increment(TrafficType::Malicious);
                warn!("malicious request {} passed: reputation {:.1}", request.id, self.reputation);
            }
            Outcome::Completed => {
                self.requests_processed += 1;
                let mut reward = request.reward_weight;
                if request.cached {
                    reward *= 1.0 + points.cache_hit_bonus;
                }
                self.money += to_decimal(reward);
                self.score.total += request.score_weight;
                match request.destination {
                    Destination::Storage => self.score.storage += request.score_weight,
                    Destination::Database => self.score.database += request.score_weight,
                    Destination::Blocked => {}
                }
            }
            Outcome::Failed => {
                self.adjust_reputation(points.fail_reputation);
                self.score.total -= request.score_weight / 2.0;
                self.failures.increment(request.traffic_type);
            }
        }
    }

    pub fn is_over(&self) -> bool {
        self.game_over.is_some()
    }

    pub fn game_over_reason(&self) -> Option<GameOverReason> {
        self.game_over
    }

    /// Reinstate a finished game from a save without re-announcing it.
    pub fn restore_game_over(&mut self, reason: Option<GameOverReason>) {
        self.game_over = reason;
    }

    /// Survival termination. Returns the reason only on the call that first
    /// detects it.
    pub fn check_termination(&mut self, money_floor: f64) -> Option<GameOverReason> {
        if self.game_over.is_some() {
            return None;
        }
        let reason = if self.reputation <= 0.0 {
            GameOverReason::Reputation
        } else if self.money <= to_decimal(money_floor) {
            GameOverReason::Bankrupt
        } else {
            return None;
        };
        info!(
            "game over ({reason:?}): money {:.2}, reputation {:.1}, score {:.0}",
            self.money(),
            self.reputation,
            self.score.total
        );
        self.game_over = Some(reason);
        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrafficProfiles;
    use rust_decimal_macros::dec;

    fn request(t: TrafficType, cached: bool) -> TrafficRequest {
        let profiles = TrafficProfiles::default();
        let p = profiles.get(t);
        TrafficRequest {
            id: 1,
            traffic_type: t,
            destination: p.destination,
            cacheable: p.cacheable,
            cache_hit_rate: p.cache_hit_rate,
            reward_weight: p.reward,
            score_weight: p.score,
            processing_weight: p.processing_weight,
            cached,
        }
    }

    #[test]
    fn test_completed_rewards_and_scores() {
        let points = ScorePoints::default();
        let mut ledger = EconomyLedger::new(0.0);
        ledger.record(&request(TrafficType::Static, false), Outcome::Completed, &points);
        ledger.record(&request(TrafficType::Read, true), Outcome::Completed, &points);
        // 0.80 + 1.20 * 1.2
        assert!((ledger.money() - 2.24).abs() < 1e-9);
        assert_eq!(ledger.score.storage, 3.0);
        assert_eq!(ledger.score.database, 5.0);
        assert_eq!(ledger.score.total, 8.0);
        assert_eq!(ledger.requests_processed, 2);
    }

    #[test]
    fn test_failures_cost_reputation() {
        let points = ScorePoints::default();
        let mut ledger = EconomyLedger::new(0.0);
        ledger.record(&request(TrafficType::Write, false), Outcome::Failed, &points);
        ledger.record(&request(TrafficType::Malicious, false), Outcome::MaliciousPassed, &points);
        assert_eq!(ledger.reputation, 90.0);
        assert_eq!(ledger.score.total, -4.0);
        assert_eq!(ledger.failures.get(TrafficType::Write), 1);
        assert_eq!(ledger.failures.get(TrafficType::Malicious), 1);
    }

    #[test]
    fn test_blocked_scores() {
        let points = ScorePoints::default();
        let mut ledger = EconomyLedger::new(0.0);
        ledger.record(&request(TrafficType::Malicious, false), Outcome::MaliciousBlocked, &points);
        assert_eq!(ledger.score.malicious_blocked, 10.0);
        assert_eq!(ledger.score.total, 10.0);
        assert_eq!(ledger.reputation, 100.0);
    }

    #[test]
    fn test_try_spend_is_all_or_nothing() {
        let mut ledger = EconomyLedger::new(50.0);
        let err = ledger.try_spend(dec!(60)).unwrap_err();
        assert_eq!(err.needed, 60.0);
        assert_eq!(ledger.money_exact(), dec!(50));
        ledger.try_spend(dec!(50)).unwrap();
        assert_eq!(ledger.money_exact(), Decimal::ZERO);
    }

    #[test]
    fn test_upkeep_ramp() {
        let scaling = UpkeepScaling::default();
        assert_eq!(upkeep_multiplier(0.0, &scaling, 1.0), 1.0);
        assert_eq!(upkeep_multiplier(300.0, &scaling, 1.0), 1.5);
        assert_eq!(upkeep_multiplier(1200.0, &scaling, 1.0), 2.0);
        assert_eq!(upkeep_multiplier(1200.0, &scaling, 2.0), 4.0);
        let off = UpkeepScaling { enabled: false, ..scaling };
        assert_eq!(upkeep_multiplier(1200.0, &off, 2.0), 2.0);
    }

    #[test]
    fn test_termination_fires_once() {
        let points = ScorePoints::default();
        let mut ledger = EconomyLedger::new(-999.0);
        assert_eq!(ledger.check_termination(-1000.0), None);
        ledger.charge_upkeep(1.0, 1.0, 1.0);
        assert_eq!(ledger.check_termination(-1000.0), Some(GameOverReason::Bankrupt));
        ledger.record(&request(TrafficType::Read, false), Outcome::Failed, &points);
        assert_eq!(ledger.check_termination(-1000.0), None);
        assert!(ledger.is_over());
    }

    #[test]
    fn test_reputation_capped_but_unbounded_below() {
        let points = ScorePoints::default();
        let mut ledger = EconomyLedger::new(0.0);
        ledger.adjust_reputation(25.0);
        assert_eq!(ledger.reputation, 100.0);
        for _ in 0..60 {
            ledger.record(&request(TrafficType::Read, false), Outcome::Failed, &points);
        }
        assert_eq!(ledger.reputation, -20.0);
        assert_eq!(ledger.check_termination(-1000.0), Some(GameOverReason::Reputation));
    }
}
