//! Audio input capture
//!
//! Captures the default input device, downmixes to mono and queues the
//! samples for the output callback, which is where the processor runs.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use super::DeviceError;

/// Running capture stream
pub struct AudioInput {
    /// Dropping the stream stops capture
    _stream: cpal::Stream,
    pub device_name: String,
}

impl AudioInput {
    /// Open the default input device and start pushing mono samples
    pub fn start(mut producer: HeapProd<f32>, gain: f32) -> Result<Self, DeviceError> {
        log::info!("Starting audio capture...");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceError::NoDevice("input"))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let config = device.default_input_config()?;
        log::info!("Input config: {:?}", config);

        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        // Full queue: drop the sample, the processor counts the gap
                        let _ = producer.try_push(frame[0] * gain);
                    }
                },
                |err| log::error!("Audio input error: {}", err),
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let _ = producer.try_push((frame[0] as f32 / 32768.0) * gain);
                    }
                },
                |err| log::error!("Audio input error: {}", err),
                None,
            )?,
            format => return Err(DeviceError::UnsupportedFormat(format)),
        };

        stream.play()?;
        log::info!("Capture started");

        Ok(Self {
            _stream: stream,
            device_name,
        })
    }
}
