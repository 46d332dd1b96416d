//! bindctl
//!
//! Loads entity scenes into a world and inspects or re-saves them.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use component_bind::snapshot::{read_scene, scene_to_json};
use component_bind::{BindConfig, ComponentFactory, Entity, World};

/// Entity scene tool
#[derive(Parser, Debug)]
#[command(name = "bindctl")]
#[command(about = "Inspect and re-save entity scenes", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the world in editor mode
    #[arg(long, env = "BINDCTL_EDITOR")]
    editor: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print every entity of a scene
    Inspect {
        /// Scene file (JSON array of entities)
        scene: PathBuf,
    },
    /// Load a scene and save it again
    Resave {
        scene: PathBuf,

        /// Output file; stdout if omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bindctl=info,component_bind=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BindConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BindConfig::default(),
    };
    if args.editor {
        config.world.editor = true;
    }

    match args.command {
        Cmd::Inspect { scene } => {
            let (world, _) = open_scene(&config, &scene)?;
            print!("{}", describe_world(&world));
        }
        Cmd::Resave { scene, out } => {
            let (world, factory) = open_scene(&config, &scene)?;
            let saved = world
                .save_scene(&factory)
                .context("Failed to save scene")?;
            let json = scene_to_json(&saved)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {} entities to {}", saved.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}

/// Build the factory from config and load a scene into a fresh world
fn open_scene(config: &BindConfig, path: &Path) -> Result<(Arc<World>, ComponentFactory)> {
    let mut factory = ComponentFactory::new();
    config
        .register_schemas(&mut factory)
        .context("Failed to register component schemas")?;
    info!("Registered component types: {:?}", factory.type_names());

    let scene = read_scene(path).with_context(|| format!("Failed to read scene {}", path.display()))?;
    let world = World::new(config.world.clone());
    world
        .load_scene(scene, &factory)
        .with_context(|| format!("Failed to load scene {}", path.display()))?;
    Ok((world, factory))
}

fn describe_world(world: &World) -> String {
    let mut out = String::new();
    for entity in world.entities() {
        describe_entity(&mut out, &entity);
    }
    out
}

fn describe_entity(out: &mut String, entity: &Entity) {
    let _ = writeln!(out, "{} (guid {})", entity, entity.guid());
    for (name, component) in entity.components() {
        let types = entity.component_types(&name).unwrap_or_default().join(", ");
        let suspended = if component.base().is_suspended() { " suspended" } else { "" };
        let _ = writeln!(out, "  component {}: {}{}", name, types, suspended);
    }
    for (name, entry) in entity.properties() {
        let _ = writeln!(out, "  property {}: {}", name, entry.value_type());
    }
    for entry in entity.commands() {
        let _ = writeln!(out, "  command {} ({:?})", entry.key, entry.permissions);
    }
    for link in entity.links() {
        let _ = writeln!(
            out,
            "  link {} -> {}.{}",
            link.source_command, link.target_entity, link.target_command
        );
    }
}
