use std::sync::mpsc::SyncSender;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, Stream, StreamConfig};

/// An open capture stream. Dropping it stops the driver callbacks.
pub(crate) struct CaptureStream {
    _stream: Stream,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Collects callback buffers into fixed-length interleaved periods.
struct PeriodSink {
    buffer: Vec<f32>,
    period_len: usize,
    tx: SyncSender<Vec<f32>>,
}

impl PeriodSink {
    fn push(&mut self, samples: impl Iterator<Item = f32>) {
        self.buffer.extend(samples);
        while self.buffer.len() >= self.period_len {
            let period: Vec<f32> = self.buffer.drain(..self.period_len).collect();
            // The analysis thread is behind; dropping a period is better than blocking the driver.
            let _ = self.tx.try_send(period);
        }
    }
}

/// Opens the named input device (or the host default) and starts streaming
/// interleaved periods of `block_size` frames into `tx`.
///
/// Must be called on the thread that keeps the returned stream alive.
pub(crate) fn open_input(
    device_name: Option<&str>,
    block_size: usize,
    tx: SyncSender<Vec<f32>>,
) -> Result<CaptureStream, String> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| format!("Failed to enumerate input devices: {}", e))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| format!("Input device '{}' not found", wanted))?,
        None => host
            .default_input_device()
            .ok_or("No input device available")?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| format!("Failed to get input config: {}", e))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels.max(1) as usize;
    let sample_rate = config.sample_rate.0;

    let sink = PeriodSink {
        buffer: Vec::with_capacity(block_size * channels * 2),
        period_len: block_size.max(1) * channels,
        tx,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32, _>(&device, &config, sink, |s| s)?,
        SampleFormat::I16 => build_stream::<i16, _>(&device, &config, sink, |s| {
            s as f32 / 32_768.0
        })?,
        SampleFormat::U16 => build_stream::<u16, _>(&device, &config, sink, |s| {
            (s as f32 - 32_768.0) / 32_768.0
        })?,
        other => return Err(format!("Unsupported sample format {:?}", other)),
    };

    stream
        .play()
        .map_err(|e| format!("Failed to start input stream: {}", e))?;

    Ok(CaptureStream {
        _stream: stream,
        sample_rate,
        channels,
    })
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: PeriodSink,
    convert: F,
) -> Result<Stream, String>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                sink.push(data.iter().map(|s| convert(*s)));
            },
            |err| {
                log::warn!("[beatfinder] input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("Failed to build input stream: {}", e))
}
