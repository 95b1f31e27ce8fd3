// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use std::fmt;

/// how severe a diagnostic is, most severe first
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub enum MessageLevel {
    Fatal,
    InternalError,
    Error,
    Warning,
    Info,
    Debug,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            MessageLevel::Fatal => "fatal",
            MessageLevel::InternalError => "internal error",
            MessageLevel::Error => "error",
            MessageLevel::Warning => "warning",
            MessageLevel::Info => "info",
            MessageLevel::Debug => "debug",
        })
    }
}

/// a diagnostic reported while analyzing or modifying a module
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.text)
    }
}

/// receives every diagnostic
pub type MessageConsumer = Box<dyn FnMut(&Message)>;

/// the default consumer: forwards each diagnostic to the `log` facade
pub fn log_message_consumer() -> MessageConsumer {
    Box::new(|message: &Message| match message.level {
        MessageLevel::Fatal | MessageLevel::InternalError | MessageLevel::Error => {
            log::error!("{}", message)
        }
        MessageLevel::Warning => log::warn!("{}", message.text),
        MessageLevel::Info => log::info!("{}", message.text),
        MessageLevel::Debug => log::debug!("{}", message.text),
    })
}
