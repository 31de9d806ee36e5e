pub mod matcher;

pub use matcher::WaitingListMatcherService;
