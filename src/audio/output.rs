//! Audio output
//!
//! The output callback is the render thread: it feeds one fixed-size quantum
//! at a time through the `SharedBufferProcessor` and copies the result to
//! every device channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use offload_rs::SharedBufferProcessor;

use super::tone::SineSource;
use super::DeviceError;

/// Frames handed to the processor per call
pub const QUANTUM: usize = 128;

/// Where the processor's input comes from
pub enum InputSource {
    /// Samples queued by the capture stream
    Capture(HeapCons<f32>),
    /// Generated tone
    Sine { frequency: f32, amplitude: f32 },
}

enum BlockSource {
    Capture(HeapCons<f32>),
    Sine(SineSource),
}

impl BlockSource {
    fn fill(&mut self, block: &mut [f32]) {
        match self {
            BlockSource::Capture(consumer) => {
                let n = consumer.pop_slice(block);
                block[n..].fill(0.0);
            }
            BlockSource::Sine(tone) => tone.fill(block),
        }
    }
}

/// Running output stream
pub struct AudioOutput {
    _stream: cpal::Stream,
    pub device_name: String,
    pub sample_rate: u32,
}

impl AudioOutput {
    /// Open the default output device and start rendering through `processor`
    pub fn start(
        mut processor: SharedBufferProcessor,
        source: InputSource,
    ) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoDevice("output"))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let config = device.default_output_config()?;
        log::info!("Output config: {:?}", config);

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(DeviceError::UnsupportedFormat(config.sample_format()));
        }

        let channels = config.channels() as usize;
        let sample_rate = config.sample_rate().0;

        let mut source = match source {
            InputSource::Capture(consumer) => BlockSource::Capture(consumer),
            InputSource::Sine {
                frequency,
                amplitude,
            } => BlockSource::Sine(SineSource::new(frequency, sample_rate, amplitude)),
        };

        // Allocated once, reused by every callback
        let mut input_block = [0.0_f32; QUANTUM];
        let mut output_block = [0.0_f32; QUANTUM];

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frames in data.chunks_mut(channels * QUANTUM) {
                    let n = frames.len() / channels;
                    let input = &mut input_block[..n];
                    let output = &mut output_block[..n];

                    source.fill(input);
                    processor.process(&[&*input], &mut [&mut *output]);

                    for (frame, &y) in frames.chunks_mut(channels).zip(output.iter()) {
                        frame.fill(y);
                    }
                }
            },
            |err| log::error!("Audio output error: {}", err),
            None,
        )?;

        stream.play()?;
        log::info!("Output started at {} Hz", sample_rate);

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
        })
    }
}
