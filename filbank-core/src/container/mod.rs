//! Чанковый контейнер filterbank данных поверх хранилища ключ → байты.

pub mod array;
pub mod codec;
pub mod file;
pub mod store;

pub use array::{ArrayMeta, ChunkedArray, WriteStats, DIM_LABELS, MASK_DTYPE};
pub use codec::{check_available, decode_chunk, effective_codec, encode_chunk};
pub use file::{
    header_from_attrs, header_to_attrs, ContainerWriter, FilterbankContainer, CLASS,
    CONTAINER_VERSION,
};
pub use store::{BlobStore, FilesystemStore, MemoryStore};
