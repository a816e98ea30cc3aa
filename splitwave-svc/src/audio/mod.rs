//! Audio container boundary: decode uploads, encode rendered tracks

pub mod decoder;
pub mod upload;
pub mod wav;

pub use decoder::{decode_audio_file, DecodeError, DecodedAudio};
pub use upload::{is_allowed_extension, sanitize_filename, ALLOWED_EXTENSIONS};
pub use wav::encode_wav;
