pub use set::{InMemorySessionSet, Participant, SessionInfo, SessionSetProvider};

mod set;
