//! User pronunciation dictionary.

mod dict;
mod part_of_speech;
mod text;
mod word;

pub use dict::UserDict;
pub use word::{InvalidWordError, UserDictWord, UserDictWordBuilder, UserDictWordType, DEFAULT_PRIORITY};
