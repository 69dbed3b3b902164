//! Injected capabilities, grouped by concern.
//!
//! Ports are opaque to the engine: they are forwarded to stages untouched
//! and never interpreted. Grouping by concern keeps interfaces segregated;
//! a stage reaches only for the port family it needs.

use std::any::Any;
use std::sync::Arc;

type AnyHandle = Arc<dyn Any + Send + Sync>;

/// Capabilities most stages need: persistence, status reporting, call
/// logging, a retry primitive, and a coarse lock.
#[derive(Clone, Default)]
pub struct CorePorts {
    /// Persistence handle (database, run store).
    pub store: Option<AnyHandle>,
    /// Callback for streaming stage status to a caller.
    pub status_callback: Option<AnyHandle>,
    /// Structured call logger.
    pub call_logger: Option<AnyHandle>,
    /// Retry primitive supplied by the host.
    pub retrier: Option<AnyHandle>,
    /// Coarse lock for stages that serialize an external resource.
    pub lock: Option<AnyHandle>,
}

impl CorePorts {
    /// Empty core ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persistence handle.
    #[must_use]
    pub fn with_store(mut self, store: AnyHandle) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the status callback.
    #[must_use]
    pub fn with_status_callback(mut self, callback: AnyHandle) -> Self {
        self.status_callback = Some(callback);
        self
    }

    /// Sets the call logger.
    #[must_use]
    pub fn with_call_logger(mut self, logger: AnyHandle) -> Self {
        self.call_logger = Some(logger);
        self
    }

    /// True when a persistence handle is configured.
    #[must_use]
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }
}

/// Capabilities for LLM-backed stages.
#[derive(Clone, Default)]
pub struct LlmPorts {
    /// Text-generation provider.
    pub provider: Option<AnyHandle>,
    /// Conversation/context building service.
    pub chat_service: Option<AnyHandle>,
}

impl LlmPorts {
    /// Empty LLM ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generation provider.
    #[must_use]
    pub fn with_provider(mut self, provider: AnyHandle) -> Self {
        self.provider = Some(provider);
        self
    }

    /// True when a provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}

/// Capabilities for audio stages.
#[derive(Clone, Default)]
pub struct AudioPorts {
    /// Text-to-speech provider.
    pub tts: Option<AnyHandle>,
    /// Speech-to-text provider.
    pub stt: Option<AnyHandle>,
    /// Raw input audio, when the run carries any.
    pub audio_data: Option<Vec<u8>>,
    /// MIME type of `audio_data`.
    pub audio_format: Option<String>,
}

impl AudioPorts {
    /// Empty audio ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTS provider.
    #[must_use]
    pub fn with_tts(mut self, provider: AnyHandle) -> Self {
        self.tts = Some(provider);
        self
    }

    /// Sets the STT provider.
    #[must_use]
    pub fn with_stt(mut self, provider: AnyHandle) -> Self {
        self.stt = Some(provider);
        self
    }

    /// Attaches raw audio input.
    #[must_use]
    pub fn with_audio(mut self, data: Vec<u8>, format: impl Into<String>) -> Self {
        self.audio_data = Some(data);
        self.audio_format = Some(format.into());
        self
    }

    /// True when input audio is attached.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.audio_data.is_some()
    }
}

/// The composed port bundle handed to every stage.
#[derive(Clone, Default)]
pub struct StagePorts {
    /// Core capabilities.
    pub core: CorePorts,
    /// LLM capabilities.
    pub llm: LlmPorts,
    /// Audio capabilities.
    pub audio: AudioPorts,
}

impl StagePorts {
    /// Empty ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the core port family.
    #[must_use]
    pub fn with_core(mut self, core: CorePorts) -> Self {
        self.core = core;
        self
    }

    /// Sets the LLM port family.
    #[must_use]
    pub fn with_llm(mut self, llm: LlmPorts) -> Self {
        self.llm = llm;
        self
    }

    /// Sets the audio port family.
    #[must_use]
    pub fn with_audio(mut self, audio: AudioPorts) -> Self {
        self.audio = audio;
        self
    }
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts")
            .field("has_store", &self.core.has_store())
            .field("has_llm", &self.llm.has_provider())
            .field("has_audio", &self.audio.has_audio())
            .finish()
    }
}
