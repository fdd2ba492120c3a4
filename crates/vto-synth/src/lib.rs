mod encode;
pub mod fallback;
pub mod preview;

pub use fallback::{FallbackImageSynthesizer, SynthContext};
pub use preview::{render_preview, PreviewGarment};
