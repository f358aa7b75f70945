pub mod application;
pub mod approval_group;
pub mod chat;
pub mod decision;
pub mod issue;
