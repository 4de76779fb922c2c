use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),
}

pub type Result<T> = std::result::Result<T, EventBusError>;
