//! Reproduce a typical leak and dump what keeps it alive.
//!
//! A map is leaked because a listener closure captured a reference to it,
//! and the listener was registered with a long-lived info object.
//! The graph of references to the map is written to the path
//! given as the only argument; its extension selects the format.
//! Options are read from `REFDUMP_OPTIONS`, for example:
//!
//! ```text
//! REFDUMP_OPTIONS='{"scan_global_regions": true}' refdump-demo leak.svg
//! ```

use {
    anyhow::{Context, Result, bail},
    refdump::{DumpError, Options, Tracker, TypeDescriptor},
    std::{env, fs, path::PathBuf, sync::OnceLock},
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

#[allow(dead_code)]
struct MapBase
{
    tiles: Vec<u32>,
    width: usize,
}

type Listener = Box<dyn Fn() -> usize + Send + Sync>;

#[allow(dead_code)]
struct Info
{
    listeners: Vec<Listener>,
    generation: u64,
}

static REGISTRY: OnceLock<&'static Info> = OnceLock::new();

/// Report a heap-allocated value to the tracker.
///
/// # Safety
///
/// The value must never be freed.
unsafe fn track<T>(tracker: &Tracker, value: &T)
{
    let base = value as *const T as usize;
    // SAFETY: Forwarded to caller.
    unsafe { tracker.on_allocate(TypeDescriptor::of::<T>(), base, false, 1) };
}

fn main() -> Result<()>
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let output = match env::args_os().nth(1) {
        Some(output) => PathBuf::from(output),
        None => bail!("Usage: refdump-demo OUTPUT"),
    };

    let options = Options::from_env().context("Read options")?;
    let tracker = refdump::init_tracking(options);

    let map: &'static MapBase =
        Box::leak(Box::new(MapBase{tiles: vec![0; 64], width: 8}));
    // SAFETY: The map is leaked.
    unsafe { track(tracker, map) };

    let listener = Box::new(move || map.tiles.len() / map.width);
    // SAFETY: The listener is owned by the leaked info below.
    unsafe { track(tracker, &*listener) };
    let listener: Listener = listener;

    let mut listeners: Vec<Listener> = Vec::with_capacity(4);
    listeners.push(listener);
    // SAFETY: The buffer is owned by a leaked Info and never grows.
    unsafe {
        tracker.on_allocate(
            TypeDescriptor::of::<Listener>(),
            listeners.as_ptr() as usize,
            true,
            listeners.capacity(),
        );
    }

    let info: &'static Info =
        Box::leak(Box::new(Info{listeners, generation: 1}));
    // SAFETY: The info is leaked.
    unsafe { track(tracker, info) };
    if REGISTRY.set(info).is_err() {
        bail!("Registry is already set");
    }

    let target = map as *const MapBase as usize;
    info!("Dumping references to map at {target:#x}");

    let resolution = match refdump::dump_reference_graph(target, &output) {
        Ok(resolution) => resolution,
        Err(DumpError::Render{description, source}) => {
            let fallback = output.with_extension("dot");
            fs::write(&fallback, description)
                .with_context(|| format!("Write {}", fallback.display()))?;
            warn!(path = %fallback.display(), "Cannot render graph: {source}");
            return Ok(());
        },
        Err(err) => return Err(err).context("Dump reference graph"),
    };

    for root in resolution.graph.root_like() {
        println!("{root}");
    }

    Ok(())
}
