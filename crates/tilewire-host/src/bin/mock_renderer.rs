//! Stand-in for the external renderer.
//!
//! Takes one argument: a scene file of `key = value` lines.
//!
//! ```text
//! width = 128
//! height = 96
//! tile_size = 64
//! segment = /SORTBLEND_SHAREMEM
//! delay_ms = 0
//! exit_code = 0
//! ```
//!
//! Every tile is filled with `[x / width, y / height, index, 1.0]` at device
//! pixel `(x, y)` and then flagged ready, in index order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tilewire::channel::{SharedChannel, TILE_READY};
use tilewire::decode::{ClippedTile, Rgba};
use tilewire::engine::DEFAULT_SEGMENT_NAME;
use tilewire::geometry::{ImageGeometry, BYTES_PER_PIXEL, DEFAULT_TILE_SIZE};
use tilewire::logging::{init_logging, LoggingConfig};

struct Scene {
    geometry: ImageGeometry,
    segment: String,
    delay: Duration,
    exit_code: i32,
}

impl Scene {
    fn parse(src: &str) -> Result<Self> {
        let mut kv = HashMap::new();
        for (n, line) in src.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("line {}: expected `key = value`", n + 1))?;
            kv.insert(k.trim().to_string(), v.trim().to_string());
        }

        fn get<T: FromStr>(kv: &HashMap<String, String>, key: &str, default: Option<T>) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match kv.get(key) {
                Some(v) => v.parse().map_err(|e| anyhow!("{key}: {e}")),
                None => default.ok_or_else(|| anyhow!("missing `{key}`")),
            }
        }

        let width: u32 = get(&kv, "width", None)?;
        let height: u32 = get(&kv, "height", None)?;
        let tile_size: u32 = get(&kv, "tile_size", Some(DEFAULT_TILE_SIZE))?;

        Ok(Self {
            geometry: ImageGeometry::new(width, height, tile_size)?,
            segment: get(&kv, "segment", Some(DEFAULT_SEGMENT_NAME.to_string()))?,
            delay: Duration::from_millis(get(&kv, "delay_ms", Some(0))?),
            exit_code: get(&kv, "exit_code", Some(0))?,
        })
    }
}

fn tile_pixels(g: &ImageGeometry, clip: &ClippedTile) -> Vec<Rgba> {
    let r = clip.rect;
    let mut out = Vec::with_capacity(r.pixel_count());
    for y in r.y..r.y + r.height {
        for x in r.x..r.x + r.width {
            out.push([
                x as f32 / g.width() as f32,
                y as f32 / g.height() as f32,
                clip.index as f32,
                1.0,
            ]);
        }
    }
    out
}

fn run() -> Result<i32> {
    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: tilewire-mock-renderer <scene file>")?;
    let src = std::fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    let scene = Scene::parse(&src)?;
    let g = scene.geometry;

    let channel = SharedChannel::attach(&scene.segment, &g)?;
    log::info!("mock renderer attached to {} ({} tiles)", channel.name(), g.tile_count());

    for index in 0..g.tile_count() {
        let clip = ClippedTile::new(&g, index);
        let pixels = tile_pixels(&g, &clip);
        let offset = clip.skip_rows as usize * clip.rect.width as usize * BYTES_PER_PIXEL;

        // Body before flag.
        channel.write_tile_bytes(index, offset, bytemuck::cast_slice(&pixels))?;
        channel.write_header_byte(index, TILE_READY)?;

        if !scene.delay.is_zero() {
            std::thread::sleep(scene.delay);
        }
    }

    Ok(scene.exit_code)
}

fn main() {
    init_logging(LoggingConfig::default());

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    }
}
