//! Audio hardware backends

use std::collections::VecDeque;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};

use super::{MicSource, MicStream, SAMPLE_RATE, SpeakerSink, SpeakerStream};
use crate::{Error, Result};

/// How long a read may wait for the input callback before the mic is considered gone
const READ_STALL: Duration = Duration::from_secs(1);

/// Callback buffers in flight between cpal and the owning thread
const HANDOFF_DEPTH: usize = 32;

/// Writes the speaker thread may run ahead of the output callback
const OUTPUT_DEPTH: usize = 4;

const FULL_SCALE: f64 = 2_147_483_647.0;

fn supports_speech(c: &SupportedStreamConfigRange, channels: u16) -> bool {
    c.channels() == channels
        && c.sample_format() == SampleFormat::F32
        && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
}

/// Default input device, mono at [`SAMPLE_RATE`]
#[derive(Debug, Default)]
pub struct CpalMic;

impl MicSource for CpalMic {
    fn open(&self) -> Result<Box<dyn MicStream>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let config: StreamConfig = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports_speech(c, 1))
            .ok_or_else(|| Error::Audio("no 16kHz mono input config found".to_string()))?
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(HANDOFF_DEPTH);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // A slow reader loses whole callback buffers, never blocks the device
                    let _ = tx.try_send(data.to_vec());
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "microphone opened"
        );

        Ok(Box::new(CpalMicStream {
            _stream: stream,
            rx,
            pending: VecDeque::new(),
        }))
    }
}

struct CpalMicStream {
    _stream: Stream,
    rx: Receiver<Vec<f32>>,
    pending: VecDeque<f32>,
}

impl MicStream for CpalMicStream {
    #[allow(clippy::cast_possible_truncation)]
    fn read_block(&mut self, raw: &mut [i32]) -> Result<()> {
        let wanted = raw.len();
        while self.pending.len() < wanted {
            let buf = self
                .rx
                .recv_timeout(READ_STALL)
                .map_err(|e| Error::Audio(format!("microphone stalled: {e}")))?;
            self.pending.extend(buf);
        }
        for (slot, sample) in raw.iter_mut().zip(self.pending.drain(..wanted)) {
            *slot = (f64::from(sample).clamp(-1.0, 1.0) * FULL_SCALE) as i32;
        }
        Ok(())
    }
}

/// Default output device at [`SAMPLE_RATE`], stereo when available
#[derive(Debug, Default)]
pub struct CpalSpeaker;

impl SpeakerSink for CpalSpeaker {
    fn open(&self) -> Result<Box<dyn SpeakerStream>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports_speech(c, 2))
            .or_else(|| {
                // Fallback: mono, left and right get mixed down
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports_speech(c, 1))
            })
            .ok_or_else(|| Error::Audio("no 16kHz output config found".to_string()))?;
        let config: StreamConfig = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();
        let channels = usize::from(config.channels);

        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(OUTPUT_DEPTH);
        let mut pending: VecDeque<(i16, i16)> = VecDeque::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        if pending.is_empty()
                            && let Ok(block) = rx.try_recv()
                        {
                            pending.extend(block.chunks_exact(2).map(|lr| (lr[0], lr[1])));
                        }
                        let (left, right) = pending.pop_front().unwrap_or_default();
                        let (left, right) = (to_f32(left), to_f32(right));
                        match frame {
                            [l, r, ..] => (*l, *r) = (left, right),
                            [mono] => *mono = f32::midpoint(left, right),
                            [] => {}
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels,
            "speaker opened"
        );

        Ok(Box::new(CpalSpeakerStream {
            _stream: stream,
            tx,
        }))
    }
}

fn to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

struct CpalSpeakerStream {
    _stream: Stream,
    tx: Sender<Vec<i16>>,
}

impl SpeakerStream for CpalSpeakerStream {
    fn write(&mut self, stereo: &[i16]) -> Result<()> {
        self.tx
            .send(stereo.to_vec())
            .map_err(|_| Error::Audio("output stream closed".to_string()))
    }
}

/// Backend for hosts run with audio switched off
///
/// Mic sessions fail to open and the speaker thread discards every chunk.
#[derive(Debug, Default)]
pub struct DisabledAudio;

impl MicSource for DisabledAudio {
    fn open(&self) -> Result<Box<dyn MicStream>> {
        Err(Error::Audio("audio is disabled".to_string()))
    }
}

impl SpeakerSink for DisabledAudio {
    fn open(&self) -> Result<Box<dyn SpeakerStream>> {
        Err(Error::Audio("audio is disabled".to_string()))
    }
}
