//! Wire protocol for Betterfly: frame extraction, optional cipher framing,
//! and the typed request/response records (`spec.md` C1, C2).

pub mod cipher;
pub mod codec;
pub mod error;
pub mod message;

pub use cipher::{ChaCha20Poly1305Cipher, FrameCipher, Identity};
pub use codec::{decode_frames, encode_frame};
pub use error::ProtoError;
pub use message::{parse_request, FileOperation, MsgType, Request, Response, ResponseKind};
