use crate::audio::{
    frame::{FrameFormat, PcmFrame},
    sink::{OutputSink, SinkError, VoiceConnector},
};
use crate::session::TenantId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, trace};

const LOG_TARGET: &str = "r_jukebox::audio::file_sink";

/// Writes raw interleaved S16LE PCM to a file.
///
/// Play the output back with e.g. `ffplay -f s16le -ar 48000 -ac 2 tenant-1.pcm`.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    format: FrameFormat,
    frames_written: u64,
}

impl FileSink {
    pub async fn create(path: impl AsRef<Path>, format: FrameFormat) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|e| SinkError::Connect(format!("cannot create {}: {}", path.display(), e)))?;
        info!(target: LOG_TARGET, "Opened PCM file sink at {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            format,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn write_frame(&mut self, frame: &PcmFrame) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        if frame.len() != self.format.bytes_per_frame() {
            return Err(SinkError::Write(format!(
                "frame is {} bytes, expected {}",
                frame.len(),
                self.format.bytes_per_frame()
            )));
        }
        writer.write_all(frame.as_bytes()).await?;
        self.frames_written += 1;
        trace!(target: LOG_TARGET, "Wrote frame {} to {}", self.frames_written, self.path.display());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
            debug!(target: LOG_TARGET, "Closed {} after {} frames", self.path.display(), self.frames_written);
        }
        Ok(())
    }

    fn frame_format(&self) -> FrameFormat {
        self.format
    }
}

/// Hands every tenant its own `tenant-<id>.pcm` file under `output_dir`.
#[derive(Debug, Clone)]
pub struct FileSinkConnector {
    output_dir: PathBuf,
    format: FrameFormat,
}

impl FileSinkConnector {
    pub fn new(output_dir: impl Into<PathBuf>, format: FrameFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    pub fn path_for(&self, tenant: TenantId) -> PathBuf {
        self.output_dir.join(format!("tenant-{}.pcm", tenant))
    }
}

#[async_trait]
impl VoiceConnector for FileSinkConnector {
    #[instrument(skip(self), fields(dir = %self.output_dir.display()))]
    async fn connect(&self, tenant: TenantId) -> Result<Box<dyn OutputSink>, SinkError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| SinkError::Connect(format!("cannot create {}: {}", self.output_dir.display(), e)))?;
        let sink = FileSink::create(self.path_for(tenant), self.format).await?;
        Ok(Box::new(sink))
    }
}
