//! Synthy CLI: real-time MIDI synth player.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;

use synthy_core::dsp::frequency_for_note;
use synthy_core::filters::LowPass;
use synthy_core::generator::{Combine, Generator};
use synthy_engine::realtime::{
    choose_config, connect_midi, midi_port_names, open_output, output_device_names, pick_device,
    stream_config,
};
use synthy_engine::{exchange, BlockExchange, Engine, EngineConfig, Voice};

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    list_midi: bool,
    demo: bool,
    device_name: Option<String>,
    midi_port: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    block_size: Option<usize>,
    volume: Option<f64>,
    duration_sec: Option<u64>,
}

fn parse_args() -> Result<Args> {
    fn num<T: std::str::FromStr>(flag: &str, v: &str) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        v.parse().with_context(|| format!("invalid value for {flag}: {v:?}"))
    }

    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--list-devices" { a.list_devices = true; continue; }
        if s == "--list-midi"    { a.list_midi    = true; continue; }
        if s == "--demo"         { a.demo         = true; continue; }
        if let Some(rest) = s.strip_prefix("--device=")      { a.device_name  = Some(rest.to_string());          continue; }
        if let Some(rest) = s.strip_prefix("--midi-port=")   { a.midi_port    = Some(rest.to_string());          continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=") { a.sample_rate  = Some(num("--sample-rate", rest)?); continue; }
        if let Some(rest) = s.strip_prefix("--channels=")    { a.channels     = Some(num("--channels", rest)?);    continue; }
        if let Some(rest) = s.strip_prefix("--block-size=")  { a.block_size   = Some(num("--block-size", rest)?);  continue; }
        if let Some(rest) = s.strip_prefix("--volume=")      { a.volume       = Some(num("--volume", rest)?);      continue; }
        if let Some(rest) = s.strip_prefix("--duration=")    { a.duration_sec = Some(num("--duration", rest)?);    continue; }
        bail!("unknown argument: {s}");
    }
    Ok(a)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Fixed patch for running without a MIDI device: a vibrato sine on A4 and a
/// filtered saw an octave below.
fn install_demo(engine: &Engine<BlockExchange>, volume: f64) {
    let sine = Generator::sine(frequency_for_note(69), volume)
        .with_frequency_modulator(Combine::Add, Generator::sine(2.0, 100.0))
        .with_frequency_modulator(Combine::Add, Generator::sine(4.0, 100.0));
    let saw = Generator::saw(frequency_for_note(57), volume).with_filter(LowPass::new(0.1));

    engine.assign(69, Voice::from(sine));
    engine.assign(57, Voice::from(saw));
    info!("demo patch installed");
}

fn main() -> Result<()> {
    init_logging();
    let args = parse_args()?;

    if args.list_devices {
        println!("Available output devices:");
        for name in output_device_names().context("listing output devices")? {
            println!("- {name}");
        }
        return Ok(());
    }
    if args.list_midi {
        println!("Available MIDI inputs:");
        for (i, name) in midi_port_names().context("listing MIDI inputs")?.iter().enumerate() {
            println!("{i}: {name}");
        }
        return Ok(());
    }

    let device  = pick_device(args.device_name.as_deref()).context("selecting output device")?;
    let sup_cfg = choose_config(&device, args.sample_rate, args.channels).context("choosing stream config")?;
    let sample_format = sup_cfg.sample_format();

    let defaults = EngineConfig::default();
    let block_size = args.block_size.unwrap_or(defaults.block_size);
    let cfg = stream_config(&sup_cfg, block_size);
    let engine_cfg = EngineConfig::default()
        .with_sample_rate(f64::from(cfg.sample_rate.0))
        .with_channel_count(usize::from(cfg.channels))
        .with_block_size(block_size)
        .with_volume(args.volume.unwrap_or(defaults.volume));

    info!(
        device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate = cfg.sample_rate.0,
        channels = cfg.channels,
        ?sample_format,
        "output selected"
    );

    let (source, consumer) = exchange(&engine_cfg);
    let stats = source.clone();
    let engine = Engine::new(&engine_cfg, source).context("starting engine")?;
    let stream = open_output(&device, &cfg, sample_format, consumer).context("building output stream")?;

    // Held for the lifetime of the run; dropping it disconnects.
    let _midi_in = if args.demo {
        install_demo(&engine, engine_cfg.volume);
        None
    } else {
        match connect_midi(args.midi_port.as_deref(), engine.midi()) {
            Ok(conn) => Some(conn),
            Err(e) if args.midi_port.is_none() => {
                warn!(error = %e, "no MIDI input, playing demo patch");
                install_demo(&engine, engine_cfg.volume);
                None
            }
            Err(e) => return Err(e).context("connecting MIDI input"),
        }
    };

    stream.play().context("starting output stream")?;
    match args.duration_sec {
        Some(d) => info!("auto-stop after {d} seconds"),
        None => info!("press Ctrl+C to stop"),
    }

    let started = Instant::now();
    let mut last_underruns = 0;
    loop {
        std::thread::sleep(Duration::from_millis(500));

        let underruns = stats.underruns();
        if underruns != last_underruns {
            trace!(underruns, delivered = stats.delivered(), "consumer underran");
            last_underruns = underruns;
        }

        if args.duration_sec.is_some_and(|d| started.elapsed() >= Duration::from_secs(d)) {
            break;
        }
    }

    // Stop the callback before the engine closes the exchange.
    drop(stream);
    drop(engine);
    info!(delivered = stats.delivered(), underruns = stats.underruns(), "done");
    Ok(())
}
