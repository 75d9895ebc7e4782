//! Groupware provider: mail, calendar, online meetings and file storage.

pub mod client;
pub mod types;

pub use client::GroupwareClient;
pub use types::{CalendarEvent, CreatedEvent, MailMessage, MeetingRequest, OnlineMeeting, UploadedFile};
