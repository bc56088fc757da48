pub mod anilist;
pub mod catalog;
pub mod consumet;
pub mod jikan;
pub mod kitsu;
pub mod mangadex;
pub mod notify;
pub mod storage;
pub mod tts;
