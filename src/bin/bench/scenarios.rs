// Scenario Definitions — prebuilt layouts played under survival rules
// Each layout is assembled through the public command surface, so a layout
// that the game would reject fails the run instead of being smuggled in.

use survival_engine::*;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    /// Starting money override; `None` keeps the survival start budget.
    pub capital: Option<f64>,
    /// Config adjustments applied before the session is created.
    pub tune: Option<fn(&mut SimConfig)>,
    pub build: fn(&mut Simulation) -> Result<(), CommandError>,
}

impl Scenario {
    pub fn matches(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.name.to_lowercase().contains(&filter)
            || self.label.to_lowercase().contains(&filter)
            || self.category.to_lowercase().contains(&filter)
    }
}

// ─── Layout Helpers ─────────────────────────────────────────────────────────

fn place(sim: &mut Simulation, kind: NodeKind, x: f64, z: f64) -> Result<NodeId, CommandError> {
    sim.place_node(kind, Position::new(x, 0.0, z))
}

fn link(sim: &mut Simulation, from: NodeId, to: NodeId) -> Result<(), CommandError> {
    sim.connect(Endpoint::Node(from), Endpoint::Node(to)).map(|_| ())
}

fn expose(sim: &mut Simulation, entry: NodeId) -> Result<(), CommandError> {
    sim.connect(Endpoint::Ingress, Endpoint::Node(entry)).map(|_| ())
}

/// Compute tier with both storage backends attached, behind an optional cache.
fn backend(
    sim: &mut Simulation,
    computes: &[NodeId],
    cache: Option<NodeId>,
    db: NodeId,
    s3: NodeId,
) -> Result<(), CommandError> {
    for &compute in computes {
        if let Some(cache) = cache {
            link(sim, compute, cache)?;
        } else {
            link(sim, compute, db)?;
            link(sim, compute, s3)?;
        }
    }
    if let Some(cache) = cache {
        link(sim, cache, db)?;
        link(sim, cache, s3)?;
    }
    Ok(())
}

// ─── Layouts ────────────────────────────────────────────────────────────────

/// Cheapest complete layout that fits the survival start budget.
fn starter(sim: &mut Simulation) -> Result<(), CommandError> {
    let waf = place(sim, NodeKind::Waf, 0.0, 0.0)?;
    let alb = place(sim, NodeKind::LoadBalancer, 4.0, 0.0)?;
    let compute = place(sim, NodeKind::Compute, 8.0, 0.0)?;
    let db = place(sim, NodeKind::Database, 12.0, -2.0)?;
    let s3 = place(sim, NodeKind::ObjectStore, 12.0, 2.0)?;
    expose(sim, waf)?;
    link(sim, waf, alb)?;
    link(sim, alb, compute)?;
    backend(sim, &[compute], None, db, s3)
}

/// Same as the starter but with the firewall missing.
fn unguarded(sim: &mut Simulation) -> Result<(), CommandError> {
    let alb = place(sim, NodeKind::LoadBalancer, 4.0, 0.0)?;
    let compute = place(sim, NodeKind::Compute, 8.0, 0.0)?;
    let db = place(sim, NodeKind::Database, 12.0, -2.0)?;
    let s3 = place(sim, NodeKind::ObjectStore, 12.0, 2.0)?;
    expose(sim, alb)?;
    link(sim, alb, compute)?;
    backend(sim, &[compute], None, db, s3)
}

fn cached_web(sim: &mut Simulation) -> Result<(), CommandError> {
    let waf = place(sim, NodeKind::Waf, 0.0, 0.0)?;
    let alb = place(sim, NodeKind::LoadBalancer, 4.0, 0.0)?;
    let c1 = place(sim, NodeKind::Compute, 8.0, -2.0)?;
    let c2 = place(sim, NodeKind::Compute, 8.0, 2.0)?;
    let cache = place(sim, NodeKind::Cache, 12.0, 0.0)?;
    let db = place(sim, NodeKind::Database, 16.0, -2.0)?;
    let s3 = place(sim, NodeKind::ObjectStore, 16.0, 2.0)?;
    expose(sim, waf)?;
    link(sim, waf, alb)?;
    link(sim, alb, c1)?;
    link(sim, alb, c2)?;
    backend(sim, &[c1, c2], Some(cache), db, s3)
}

fn queued_backend(sim: &mut Simulation) -> Result<(), CommandError> {
    let waf = place(sim, NodeKind::Waf, 0.0, 0.0)?;
    let sqs = place(sim, NodeKind::Queue, 4.0, 0.0)?;
    let alb = place(sim, NodeKind::LoadBalancer, 8.0, 0.0)?;
    let c1 = place(sim, NodeKind::Compute, 12.0, -2.0)?;
    let c2 = place(sim, NodeKind::Compute, 12.0, 2.0)?;
    let db = place(sim, NodeKind::Database, 16.0, -2.0)?;
    let s3 = place(sim, NodeKind::ObjectStore, 16.0, 2.0)?;
    expose(sim, waf)?;
    link(sim, waf, sqs)?;
    link(sim, sqs, alb)?;
    link(sim, alb, c1)?;
    link(sim, alb, c2)?;
    backend(sim, &[c1, c2], None, db, s3)
}

/// Wide, fully upgraded layout with a cache in front of the stores.
fn fortress(sim: &mut Simulation) -> Result<(), CommandError> {
    let waf = place(sim, NodeKind::Waf, 0.0, 0.0)?;
    let sqs = place(sim, NodeKind::Queue, 4.0, 0.0)?;
    let alb = place(sim, NodeKind::LoadBalancer, 8.0, 0.0)?;
    let computes = [
        place(sim, NodeKind::Compute, 12.0, -4.0)?,
        place(sim, NodeKind::Compute, 12.0, 0.0)?,
        place(sim, NodeKind::Compute, 12.0, 4.0)?,
    ];
    let cache = place(sim, NodeKind::Cache, 16.0, 0.0)?;
    let db = place(sim, NodeKind::Database, 20.0, -2.0)?;
    let s3 = place(sim, NodeKind::ObjectStore, 20.0, 2.0)?;
    expose(sim, waf)?;
    link(sim, waf, sqs)?;
    link(sim, sqs, alb)?;
    for &compute in &computes {
        link(sim, alb, compute)?;
    }
    backend(sim, &computes, Some(cache), db, s3)?;

    for id in computes.into_iter().chain([cache, db]) {
        while sim.upgrade_node(id).is_ok() {}
    }
    Ok(())
}

// ─── Config Tweaks ──────────────────────────────────────────────────────────

fn calm(config: &mut SimConfig) {
    let survival = &mut config.survival;
    survival.malicious_spike.enabled = false;
    survival.traffic_shifts.enabled = false;
    survival.random_events.enabled = false;
}

fn no_degradation(config: &mut SimConfig) {
    config.survival.degradation.enabled = false;
}

// ─── Registry ───────────────────────────────────────────────────────────────

pub fn all_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "STARTER",
            label: "Starter layout on the opening budget",
            category: "baseline",
            capital: None,
            tune: None,
            build: starter,
        },
        Scenario {
            name: "STARTER_CALM",
            label: "Starter layout, interventions off",
            category: "baseline",
            capital: None,
            tune: Some(calm),
            build: starter,
        },
        Scenario {
            name: "UNGUARDED",
            label: "No firewall, malicious traffic leaks",
            category: "security",
            capital: None,
            tune: None,
            build: unguarded,
        },
        Scenario {
            name: "CACHED_WEB",
            label: "Two compute nodes behind a cache",
            category: "scaling",
            capital: Some(800.0),
            tune: None,
            build: cached_web,
        },
        Scenario {
            name: "QUEUED_BACKEND",
            label: "Message queue absorbing bursts",
            category: "scaling",
            capital: Some(800.0),
            tune: None,
            build: queued_backend,
        },
        Scenario {
            name: "FORTRESS",
            label: "Max-tier wide layout",
            category: "endurance",
            capital: Some(4000.0),
            tune: None,
            build: fortress,
        },
        Scenario {
            name: "FORTRESS_NO_WEAR",
            label: "Max-tier wide layout, no health decay",
            category: "endurance",
            capital: Some(4000.0),
            tune: Some(no_degradation),
            build: fortress,
        },
    ]
}
