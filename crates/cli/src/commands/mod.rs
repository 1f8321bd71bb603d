pub mod ask;
pub mod call;
pub mod chat;
pub mod doctor;
pub mod serve;
pub mod tools;
