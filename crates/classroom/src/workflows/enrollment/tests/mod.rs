mod common;
mod notifications;
