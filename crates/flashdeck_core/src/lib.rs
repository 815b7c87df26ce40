pub mod domain;
pub mod ports;
pub mod repository;

pub use domain::{
    Flashcard, FlashcardSet, GeneratedCard, NewUser, RateLimitDecision, Session, User,
};
pub use ports::{
    CardGenerationService, FlashcardStorage, PortError, PortResult, RateLimiter, SessionStore,
    DEFAULT_GENERATION_LIMIT, RATE_LIMIT_WINDOW_HOURS,
};
pub use repository::Repository;
