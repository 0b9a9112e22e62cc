//! Channel senders for reminder delivery.
//!
//! The engine only sees the [`TemplateSender`] / [`EmailSender`] traits and their
//! [`SendResult`] contract. Concrete adapters talk to the WhatsApp Cloud API and
//! the Resend email API; [`Channels`] bounds every call with a timeout and fans a
//! message out to both channels independently.

pub mod dispatch;
pub mod email;
pub mod phone;
pub mod sender;
pub mod whatsapp;

pub use dispatch::{Channels, DispatchReport, Envelope};
pub use email::{ResendConfig, ResendEmailSender};
pub use phone::{PhoneError, PhoneNormalizer};
pub use sender::{EmailSender, SendResult, TemplateSender, UnconfiguredChannel};
pub use whatsapp::{WhatsAppConfig, WhatsAppTemplateSender};
