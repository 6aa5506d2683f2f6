pub mod api;
pub mod job;
pub mod line_item;
pub mod notification;
pub mod token;
