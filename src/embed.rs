use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::record::EmbeddingRecord;

const MODEL_FILE: &str = "model.onnx";

/// Speaker models are trained on 16 kHz mono input.
const SAMPLE_RATE: u32 = 16000;

/// Compute device the ONNX session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Pick CUDA when the execution provider is usable, else CPU.
    #[must_use]
    pub fn detect() -> Self {
        if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        })
    }
}

/// Pretrained speaker-embedding model, loaded once per run and shared by
/// both split extractions.
pub struct Embedder {
    session: Session,
    input_name: String,
}

impl Embedder {
    /// Load `model.onnx` from the pretrain directory and bind it to the
    /// given device.
    pub fn load(pretrain_dir: &Path, device: Device) -> Result<Self> {
        let model_path = pretrain_dir.join(MODEL_FILE);
        if !model_path.exists() {
            bail!(
                "pretrained model not found at {} (expected {MODEL_FILE} in --pretrain_dir)",
                model_path.display()
            );
        }

        let mut builder = Session::builder()?;
        if device == Device::Cuda {
            builder =
                builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = builder
            .commit_from_file(&model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .context("model has no inputs")?
            .name
            .clone();

        Ok(Self {
            session,
            input_name,
        })
    }

    /// Extract one embedding per path, in input order.
    ///
    /// No per-file recovery: an unreadable file or a failed inference call
    /// aborts the whole batch.
    pub fn extract(&mut self, paths: &[PathBuf], quiet: bool) -> Result<Vec<EmbeddingRecord>> {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(u64::try_from(paths.len()).unwrap_or(u64::MAX));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} Extracting embeddings")
                    .expect("template"),
            );
            pb
        };

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            pb.inc(1);
            let embedding = self
                .embed_file(path)
                .with_context(|| format!("failed to embed {}", path.display()))?;
            records.push(EmbeddingRecord {
                file_path: path.to_string_lossy().to_string(),
                embedding,
                label: String::new(),
            });
        }

        pb.finish_and_clear();
        Ok(records)
    }

    fn embed_file(&mut self, path: &Path) -> Result<Vec<f32>> {
        let pcm = decode_audio(path)?;
        if pcm.is_empty() {
            bail!("decoded zero samples");
        }

        let input_tensor = Tensor::from_array(([1usize, pcm.len()], pcm))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

/// Decode an audio file to mono PCM f32 samples at 16 kHz.
pub(crate) fn decode_audio(path: &Path) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format.default_track().context("no audio track found")?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let source_rate = codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let channels = codec_params
        .channels
        .map_or(1, symphonia::core::audio::Channels::count);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        let Ok(decoded) = decoder.decode(&packet) else {
            continue;
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        let mut sample_buf =
            SampleBuffer::<f32>::new(u64::try_from(num_frames).unwrap_or(u64::MAX), spec);
        sample_buf.copy_interleaved_ref(decoded);

        // Mix down to mono
        for frame in sample_buf.samples().chunks(channels) {
            #[allow(clippy::cast_precision_loss)]
            let mono: f32 = frame.iter().sum::<f32>() / channels as f32;
            samples.push(mono);
        }
    }

    if source_rate != SAMPLE_RATE {
        samples = resample(&samples, source_rate, SAMPLE_RATE);
    }

    Ok(samples)
}

/// Simple linear resampling.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (input.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let idx1 = (idx0 + 1).min(input.len() - 1);
        output.push(input[idx0] * (1.0 - frac) + input[idx1] * frac);
    }

    output
}
