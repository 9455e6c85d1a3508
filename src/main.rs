//! offload-rs - shared-buffer audio offload demo
//!
//! Routes live input (or a test tone) through a worker-thread kernel and
//! plays the result. The audio callback only moves samples in and out of
//! the shared rings; the kernel runs on the worker.

use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use ringbuf::traits::Split;
use ringbuf::HeapRb;

use offload_rs::{
    KernelChoice, Overdrive, Passthrough, SharedBufferNode, SharedBufferProcessor, Settings,
    SourceMode,
};

mod audio;

use audio::{AudioInput, AudioOutput, DeviceError, InputSource};

/// Capacity of the capture -> render queue, in samples
const CAPTURE_QUEUE: usize = 48000;

fn main() -> Result<(), DeviceError> {
    env_logger::init();
    log::info!("Starting offload-rs");

    let settings = Settings::load();
    let options = settings.node_options();

    let (mut node, processor): (SharedBufferNode, SharedBufferProcessor) = match settings.kernel
    {
        KernelChoice::Overdrive => SharedBufferNode::new(options, Overdrive)?,
        KernelChoice::Passthrough => SharedBufferNode::new(options, Passthrough)?,
    };

    // Keep the capture stream alive for as long as we play
    let mut capture = None;
    let source = match settings.source {
        SourceMode::Input => {
            let (prod, cons) = HeapRb::<f32>::new(CAPTURE_QUEUE).split();
            match AudioInput::start(prod, settings.gain) {
                Ok(input) => {
                    log::info!("Capturing from {}", input.device_name);
                    capture = Some(input);
                    InputSource::Capture(cons)
                }
                Err(e) => {
                    log::warn!("No capture ({}), using {} Hz tone", e, settings.sine_frequency);
                    sine(&settings)
                }
            }
        }
        SourceMode::Sine => sine(&settings),
    };

    let output = AudioOutput::start(processor, source)?;
    log::info!(
        "Playing through {} at {} Hz",
        output.device_name,
        output.sample_rate
    );

    node.wait_processor_ready(Duration::from_secs(2))?;

    println!("Running. Press Enter to stop.");
    let (quit_tx, quit_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = quit_tx.send(());
    });

    loop {
        match quit_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let snap = node.snapshot();
                log::info!(
                    "passes {} | in {} out {} | overruns {} underruns {}",
                    snap.kernel_passes,
                    snap.input_frames_available,
                    snap.output_frames_available,
                    snap.input_overruns,
                    snap.output_underruns
                );
            }
        }
    }

    drop(output);
    drop(capture);
    node.shutdown();
    Ok(())
}

fn sine(settings: &Settings) -> InputSource {
    InputSource::Sine {
        frequency: settings.sine_frequency,
        amplitude: 0.5 * settings.gain,
    }
}
