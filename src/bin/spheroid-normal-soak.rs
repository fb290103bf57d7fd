use std::path::Path;

use anyhow::{bail, Context};
use bevy::{
    ecs::entity::Entity,
    math::{Mat4, Quat, UVec4, Vec3, Vec4},
};
use clap::{Arg, Command};
use rand::{rngs::StdRng, Rng, SeedableRng};

use spheroid_normal::{
    pipeline::{mean_bone_position, resolve_bone_position, PipelineSource, SkinSource, SpheroidNormalPipeline},
    resources::{load_settings, SpheroidNormalSettings},
};

fn random_skin(rng: &mut StdRng, bone_count: usize, vertex_count: usize) -> anyhow::Result<SkinSource> {
    let mut bone_indices = Vec::with_capacity(vertex_count);
    let mut bone_weights = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let mut index = || rng.gen_range(0..bone_count as u32);
        bone_indices.push(UVec4::new(index(), index(), index(), index()));

        let weights = Vec4::new(rng.gen(), rng.gen(), rng.gen(), rng.gen());
        bone_weights.push(weights / weights.element_sum().max(f32::EPSILON));
    }
    Ok(SkinSource::from_parts(bone_indices, bone_weights, bone_count)?)
}

fn random_point(rng: &mut StdRng) -> Vec3 {
    Vec3::new(
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
    )
}

fn run(settings: &SpheroidNormalSettings, frames: u64, bone_count: usize, vertex_count: usize, seed: u64) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let skin = random_skin(&mut rng, bone_count, vertex_count)?;
    let joints: Vec<Entity> = (0..bone_count as u32).map(Entity::from_raw).collect();

    let mut pipeline = SpheroidNormalPipeline::default();
    pipeline.initialize(|| PipelineSource::new(skin.clone(), joints))?;

    let config = settings.frame_job_config(true);
    let mut bone_world_positions = vec![Vec3::ZERO; bone_count];

    for frame in 0..frames {
        // Occasionally cycle the lifecycle mid-run.
        if frame > 0 && frame % 1000 == 0 {
            pipeline.release();
            let joints: Vec<Entity> = (0..bone_count as u32).map(Entity::from_raw).collect();
            pipeline.initialize(|| PipelineSource::new(skin.clone(), joints))?;
        }

        bone_world_positions.iter_mut().for_each(|position| *position = random_point(&mut rng));
        let object_to_world = Mat4::from_rotation_translation(
            Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)),
            random_point(&mut rng),
        );
        let world_to_object = object_to_world.inverse();

        let scheduled = pipeline.schedule_frame(config, world_to_object, |_, out| {
            out.copy_from_slice(&bone_world_positions);
            true
        });
        if !scheduled {
            bail!("frame {} was not scheduled", frame);
        }

        let Some(results) = pipeline.complete_frame() else {
            bail!("frame {} produced no results", frame);
        };

        let expected_bones: Vec<Vec3> = bone_world_positions
            .iter()
            .map(|position| resolve_bone_position(&world_to_object, *position))
            .collect();
        if results.bone_positions != expected_bones.as_slice() {
            bail!("frame {}: bone positions differ from the sequential result", frame);
        }

        if config.mean_bone_positions {
            for (vertex, actual) in results.mean_bone_positions.iter().enumerate() {
                let expected = mean_bone_position(
                    &expected_bones,
                    skin.bone_indices()[vertex],
                    skin.bone_weights()[vertex],
                );
                if expected != *actual {
                    bail!(
                        "frame {} vertex {}: expected {:?}, got {:?}",
                        frame,
                        vertex,
                        expected,
                        actual
                    );
                }
            }
        }
    }

    log::info!(
        "[SPHEROID NORMAL] soak finished: {} frames, {} init, {} release",
        pipeline.frames_completed(),
        pipeline.init_call_count(),
        pipeline.release_call_count()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("spheroid-normal-soak")
        .about("Runs the mean bone position pipeline against random skeletons and checks every frame")
        .arg(
            Arg::new("frames")
                .long("frames")
                .takes_value(true)
                .default_value("10000"),
        )
        .arg(Arg::new("bones").long("bones").takes_value(true).default_value("64"))
        .arg(
            Arg::new("vertices")
                .long("vertices")
                .takes_value(true)
                .default_value("4096"),
        )
        .arg(Arg::new("seed").long("seed").takes_value(true).default_value("0"))
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .help("Path to a spheroid normal settings toml file"),
        )
        .get_matches();

    let frames: u64 = matches
        .value_of("frames")
        .unwrap_or("10000")
        .parse()
        .context("--frames must be a number")?;
    let bones: usize = matches
        .value_of("bones")
        .unwrap_or("64")
        .parse()
        .context("--bones must be a number")?;
    let vertices: usize = matches
        .value_of("vertices")
        .unwrap_or("4096")
        .parse()
        .context("--vertices must be a number")?;
    let seed: u64 = matches
        .value_of("seed")
        .unwrap_or("0")
        .parse()
        .context("--seed must be a number")?;
    if bones == 0 {
        bail!("--bones must be at least 1");
    }

    let settings = matches
        .value_of("config")
        .map(|path| load_settings(Path::new(path)))
        .unwrap_or_default();
    log::info!(
        "[SPHEROID NORMAL] soak: {} frames, {} bones, {} vertices, batch size {}",
        frames,
        bones,
        vertices,
        settings.batch_size
    );

    run(&settings, frames, bones, vertices, seed)
}
