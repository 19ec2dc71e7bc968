//! Loads images through the texture cache and prints what ended up in device memory.
//!
//! ```text
//! texcache-probe [--settings cache.json] [--limit 2048] [--gpu] <image>...
//! ```
//!
//! Set `RUST_LOG=texcache=debug` for per-image details.

use std::sync::Arc;

use anyhow::{Context, bail};
use texcache::{
    CacheSettings, CpuDevice, Device, ImageRequest, Progress, RenderStats, TextureCache,
};

#[cfg(feature = "wgpu")]
fn gpu_device() -> anyhow::Result<Arc<dyn Device>> {
    Ok(Arc::new(texcache::device::WgpuDevice::new()?))
}

#[cfg(not(feature = "wgpu"))]
fn gpu_device() -> anyhow::Result<Arc<dyn Device>> {
    bail!("built without the `wgpu` feature")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut settings = CacheSettings::default();
    let mut paths = Vec::new();
    let mut gpu = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let file = args.next().context("--settings needs a file")?;
                settings = CacheSettings::from_json_file(&file)
                    .with_context(|| format!("reading settings '{file}'"))?;
            }
            "--limit" => {
                let limit = args.next().context("--limit needs a value")?;
                settings.texture_limit = limit
                    .parse()
                    .with_context(|| format!("invalid texture limit '{limit}'"))?;
            }
            "--gpu" => gpu = true,
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        bail!("usage: texcache-probe [--settings FILE] [--limit N] [--gpu] <image>...");
    }

    let device: Arc<dyn Device> = if gpu {
        gpu_device()?
    } else {
        Arc::new(CpuDevice::new())
    };
    let mut cache = TextureCache::builder()
        .with_settings(settings)
        .with_device(device)
        .build()?;
    log::info!("Probing {} images on '{}'", paths.len(), cache.device_info().name);

    let slots: Vec<_> = paths
        .iter()
        .map(|path| (path, cache.add_image(&ImageRequest::file(path))))
        .collect();

    cache.device_update(&Progress::new());

    for (path, slot) in &slots {
        match cache.image_metadata(*slot) {
            Some(meta) => println!(
                "{path}: {}x{}x{} {} ch, {} in {}",
                meta.width, meta.height, meta.depth, meta.channels, meta.data_type, meta.colorspace
            ),
            None => println!("{path}: not registered"),
        }
    }

    let mut stats = RenderStats::new();
    cache.collect_statistics(&mut stats);
    print!("{}", stats.report());
    Ok(())
}
