//! Aberred simulation harness.
//!
//! Headless driver for the simulation core: loads `config.ini` and a scene
//! description, optionally scatters random bodies across the arena, then runs
//! a fixed number of frames through the [`Engine`] while logging collision
//! events.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --release -- --scene assets/scenes/demo.json --scatter 50
//! ```

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use glam::Vec2;
use log::{error, info};

use aberredsim::components::collider::Collider;
use aberredsim::components::rigidbody::RigidBody;
use aberredsim::components::transform::Transform;
use aberredsim::entity::EntityId;
use aberredsim::entity::config::{ActorConfig, ComponentRegistry, SceneConfig};
use aberredsim::entity::tree::EntityTree;
use aberredsim::error::SetupError;
use aberredsim::events::bus::{Event, EventKind};
use aberredsim::resources::simconfig::SimConfig;
use aberredsim::systems::engine::Engine;
use aberredsim::systems::physics::PhysicsSystem;

const DEFAULT_ARENA: (f64, f64) = (800.0, 600.0);

/// Aberred headless 2D simulation
#[derive(Parser)]
#[command(version, about = "Runs a scene through the Aberred simulation core without rendering.")]
struct Cli {
    /// INI configuration file.
    #[arg(long, value_name = "PATH", default_value = "config.ini")]
    config: PathBuf,

    /// Scene description (JSON).
    #[arg(long, value_name = "PATH", default_value = "assets/scenes/demo.json")]
    scene: PathBuf,

    /// Number of frames to run.
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Wall-clock seconds per frame.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_time: f32,

    /// Extra bodies spawned at random positions.
    #[arg(long, default_value_t = 0)]
    scatter: u32,

    /// Scene template used for scattered bodies.
    #[arg(long, default_value = "ball")]
    template: String,

    /// Seed for the scatter generator.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), SetupError> {
    let mut config = SimConfig::with_path(&cli.config);
    if cli.config.exists() {
        config.load_from_file()?;
    } else {
        info!("{} not found, using defaults", cli.config.display());
    }

    let text = std::fs::read_to_string(&cli.scene).map_err(|e| {
        SetupError::Config(format!("cannot read {}: {e}", cli.scene.display()))
    })?;
    let scene_config = SceneConfig::from_json(&text)?;

    let registry = ComponentRegistry::with_builtins();
    let mut tree = EntityTree::new();
    let scene = tree.build_scene(&registry, &scene_config)?;

    if cli.scatter > 0 {
        let mut rng = match cli.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        scatter(&mut tree, &registry, scene, cli, &mut rng)?;
    }

    let enters = Rc::new(Cell::new(0usize));
    let leaves = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&enters);
    tree.on(scene, EventKind::CollisionEnter, move |event: &Event, tree: &EntityTree| {
        if let Some(c) = event.payload().collision() {
            // Each pair is published on both actors; count it once.
            if event.target() == c.a {
                counter.set(counter.get() + 1);
                log::debug!(
                    "enter: '{}' / '{}' depth {:.3}",
                    tree.name(c.a).unwrap_or("?"),
                    tree.name(c.b).unwrap_or("?"),
                    c.mtv.depth()
                );
            }
        }
    })?;
    let counter = Rc::clone(&leaves);
    tree.on(scene, EventKind::CollisionLeave, move |event: &Event, _: &EntityTree| {
        if event.payload().collision().is_some_and(|c| event.target() == c.a) {
            counter.set(counter.get() + 1);
        }
    })?;

    let physics = PhysicsSystem::new(&tree, scene, &config)?;
    let mut engine = Engine::new(tree, config);
    engine.add_system(physics);

    let mut fixed_steps = 0u64;
    for _ in 0..cli.frames {
        fixed_steps += u64::from(engine.tick(cli.frame_time).fixed_steps);
    }

    let time = engine.time();
    info!(
        "ran {} frames ({} fixed steps, {:.2}s simulated): {} collisions entered, {} left",
        time.frame_count,
        fixed_steps,
        time.elapsed,
        enters.get(),
        leaves.get()
    );
    Ok(())
}

/// Spawn `cli.scatter` bodies at random positions inside the scene arena.
///
/// Uses the scene template named `cli.template` when there is one, and a
/// plain circle otherwise.
fn scatter(
    tree: &mut EntityTree,
    registry: &ComponentRegistry,
    scene: EntityId,
    cli: &Cli,
    rng: &mut fastrand::Rng,
) -> Result<(), SetupError> {
    let (width, height) = tree
        .scene_data(scene)
        .map(|data| {
            (
                data.get_f64("width").unwrap_or(DEFAULT_ARENA.0),
                data.get_f64("height").unwrap_or(DEFAULT_ARENA.1),
            )
        })
        .unwrap_or(DEFAULT_ARENA);
    let has_template = tree
        .scene_node(scene)
        .is_some_and(|node| node.templates.contains_key(&cli.template));

    for i in 0..cli.scatter {
        let position = Vec2::new(rng.f32() * width as f32, rng.f32() * height as f32);
        let velocity = Vec2::new(rng.f32() - 0.5, rng.f32() - 0.5) * 200.0;
        let actor = if has_template {
            tree.spawn(registry, scene, &cli.template)?
        } else {
            let fallback = ActorConfig::named(format!("scatter-{i}"))
                .with_component(&Transform::default())?
                .with_component(&Collider::circle(4.0 + rng.f32() * 8.0))?
                .with_component(&RigidBody::new())?;
            tree.build_actor(registry, &fallback, scene)?
        };
        if let Some(mut transform) = tree.transform_mut(actor) {
            transform.set_world_position(position);
        }
        if let Some(body) = tree.get_component_mut::<RigidBody>(actor) {
            body.set_velocity(velocity);
        }
    }
    info!(
        "scattered {} bodies over {}x{} ({})",
        cli.scatter,
        width,
        height,
        if has_template {
            cli.template.as_str()
        } else {
            "circles"
        }
    );
    Ok(())
}
