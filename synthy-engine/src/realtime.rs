//! Realtime glue: cpal output and midir input.
//!
//! Thin adapters at the transport boundary. The output callback only talks
//! to the engine through [`BlockConsumer`] and never allocates or logs. The
//! MIDI callback goes through [`MidiHandle`]; a note-on builds its voice
//! there, so that callback does allocate (and logs at debug).

use cpal::traits::{DeviceTrait, HostTrait};
use midir::{Ignore, MidiInputConnection};
use tracing::{info, warn};

use crate::engine::MidiHandle;
use crate::error::{Error, Result};
use crate::handoff::BlockConsumer;

const MIDI_CLIENT_NAME: &str = "synthy";

/// Names of the default host's output devices.
pub fn output_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices()? {
        names.push(dev.name()?);
    }
    Ok(names)
}

/// Output device by exact name, or the host default.
pub fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        return Err(Error::Device(format!("requested device not found: {name}")));
    }
    host.default_output_device()
        .ok_or_else(|| Error::Device("no default output device".into()))
}

/// Closest output config the engine can drive.
///
/// Only formats [`open_output`] can build are considered. Ranges are scored by
/// sample-rate distance first, then channel distance, and `f32` wins ties
/// since blocks are rendered in `f32`. With nothing requested the device
/// default is used when its format is buildable.
pub fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig> {
    if req_sr.is_none() && req_ch.is_none() {
        let default = device.default_output_config()?;
        if is_buildable(default.sample_format()) {
            return Ok(default);
        }
    }

    let best = device
        .supported_output_configs()?
        .filter(|range| is_buildable(range.sample_format()))
        .min_by_key(|range| {
            let sr_pen = req_sr.map_or(0, |sr| {
                let (lo, hi) = (range.min_sample_rate().0, range.max_sample_rate().0);
                if (lo..=hi).contains(&sr) { 0 } else { u64::from(lo.abs_diff(sr).min(hi.abs_diff(sr))) }
            });
            let ch_pen = req_ch.map_or(0, |c| u64::from(range.channels().abs_diff(c)));
            let fmt_pen = u64::from(range.sample_format() != cpal::SampleFormat::F32);
            (sr_pen, ch_pen, fmt_pen)
        })
        .ok_or_else(|| Error::Device("no output config with a supported sample format".into()))?;

    let (lo, hi) = (best.min_sample_rate().0, best.max_sample_rate().0);
    let sr = req_sr.map_or(hi, |sr| sr.clamp(lo, hi));
    Ok(best.with_sample_rate(cpal::SampleRate(sr)))
}

/// Concrete stream config asking the device for `block_size` frames per
/// callback when it reports that size as supported.
pub fn stream_config(supported: &cpal::SupportedStreamConfig, block_size: usize) -> cpal::StreamConfig {
    let mut cfg = supported.config();
    if let (cpal::SupportedBufferSize::Range { min, max }, Ok(frames)) =
        (supported.buffer_size(), u32::try_from(block_size))
    {
        if (*min..=*max).contains(&frames) {
            cfg.buffer_size = cpal::BufferSize::Fixed(frames);
        }
    }
    cfg
}

fn is_buildable(format: cpal::SampleFormat) -> bool {
    matches!(format, cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16)
}

/// Build (but do not start) an output stream fed by `consumer`.
pub fn open_output(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    consumer: BlockConsumer,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, cfg, consumer),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, cfg, consumer),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, cfg, consumer),
        other => Err(Error::Stream(format!("unsupported device sample format: {other:?}"))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut consumer: BlockConsumer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels).max(1);

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            // Hardware block size drives the next block's size.
            let frames = output.len() / channels;
            if frames != consumer.sample_count() {
                consumer.set_sample_count(frames);
            }
            consumer.fill_interleaved(output, channels, |s| T::from_sample(s.clamp(-1.0, 1.0)));
        },
        |e: cpal::StreamError| warn!(error = %e, "stream error"),
        None,
    )?;

    Ok(stream)
}

/// Names of the available MIDI input ports.
pub fn midi_port_names() -> Result<Vec<String>> {
    let input = midir::MidiInput::new(MIDI_CLIENT_NAME)?;
    input
        .ports()
        .iter()
        .map(|p| input.port_name(p).map_err(Error::from))
        .collect()
}

/// Connect a MIDI input port to the engine. `port` matches by index or by
/// name substring; `None` takes the first port. Keep the returned connection
/// alive for as long as input should flow.
pub fn connect_midi(port: Option<&str>, handle: MidiHandle) -> Result<MidiInputConnection<()>> {
    let mut input = midir::MidiInput::new(MIDI_CLIENT_NAME)?;
    input.ignore(Ignore::All);

    let ports = input.ports();
    let chosen = match port {
        None => ports.first(),
        Some(wanted) => match wanted.parse::<usize>() {
            Ok(index) => ports.get(index),
            Err(_) => ports
                .iter()
                .find(|p| input.port_name(p).is_ok_and(|n| n.contains(wanted))),
        },
    };
    let chosen = chosen
        .cloned()
        .ok_or_else(|| Error::Midi(format!("no MIDI input port matching {:?}", port.unwrap_or("<first>"))))?;
    let name = input.port_name(&chosen)?;

    let conn = input.connect(
        &chosen,
        "synthy-in",
        move |_stamp, message, _| {
            if let Some((&status, data)) = message.split_first() {
                handle.handle_raw(status, data);
            }
        },
        (),
    )?;
    info!(port = %name, "MIDI input connected");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buildable_formats_match_open_output() {
        assert!(is_buildable(cpal::SampleFormat::F32));
        assert!(is_buildable(cpal::SampleFormat::I16));
        assert!(is_buildable(cpal::SampleFormat::U16));
        assert!(!is_buildable(cpal::SampleFormat::F64));
        assert!(!is_buildable(cpal::SampleFormat::U8));
    }
}
