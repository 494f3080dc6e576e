pub mod domain;
pub mod ports;

pub use domain::{
    AccountRequest, Flashcard, FlashcardPatch, Message, MessageRead, NewAccountRequest,
    NewFlashcard, NewPack, NewUser, Pack, PackPatch, RequestStatus, Role, User, UserPatch,
    MESSAGE_RETENTION_DAYS,
};
pub use ports::{is_valid_recipient, PortError, PortResult, StorageService};
