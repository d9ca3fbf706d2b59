//! Receive filters and timeouts

use crate::message::{Message, MessageClass};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// User predicate over inbound messages
pub type MessagePredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Selects which inbound message a `receive` call takes
#[derive(Clone, Default)]
pub enum Filter {
    /// First message of any kind
    #[default]
    Any,
    /// The reply to the message with this id
    InReplyTo(String),
    /// Messages whose class tag equals this qualified or short name
    Class(String),
    /// Messages of this class or a subclass
    InstanceOf(Arc<MessageClass>),
    Predicate(MessagePredicate),
}

impl Filter {
    pub fn predicate(f: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        Filter::Predicate(Arc::new(f))
    }

    /// True if evaluating the filter runs user code
    pub(crate) fn is_user_code(&self) -> bool {
        matches!(self, Filter::Predicate(_))
    }

    /// A panicking predicate counts as a non-match
    pub fn matches(&self, msg: &Message) -> bool {
        match self {
            Filter::Any => true,
            Filter::InReplyTo(id) => msg.in_reply_to.as_deref() == Some(id.as_str()),
            Filter::Class(name) => {
                msg.clazz() == name || (!name.contains('.') && msg.short_name() == name)
            }
            Filter::InstanceOf(class) => msg.is_instance_of(class),
            Filter::Predicate(f) => match catch_unwind(AssertUnwindSafe(|| f(msg))) {
                Ok(matched) => matched,
                Err(_) => {
                    warn!(msg_id = %msg.msg_id, "Receive predicate panicked");
                    false
                }
            },
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Any => f.write_str("Any"),
            Filter::InReplyTo(id) => f.debug_tuple("InReplyTo").field(id).finish(),
            Filter::Class(name) => f.debug_tuple("Class").field(name).finish(),
            Filter::InstanceOf(class) => f.debug_tuple("InstanceOf").field(&class.name()).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&Message> for Filter {
    fn from(msg: &Message) -> Self {
        Filter::InReplyTo(msg.msg_id.clone())
    }
}

impl From<Arc<MessageClass>> for Filter {
    fn from(class: Arc<MessageClass>) -> Self {
        Filter::InstanceOf(class)
    }
}

impl From<&Arc<MessageClass>> for Filter {
    fn from(class: &Arc<MessageClass>) -> Self {
        Filter::InstanceOf(Arc::clone(class))
    }
}

/// How long a `receive` call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveTimeout {
    /// Only look at already-queued messages
    NonBlocking,
    After(Duration),
    Forever,
}

/// Milliseconds: `0` never waits, positive waits that long, negative waits forever
impl From<i64> for ReceiveTimeout {
    fn from(ms: i64) -> Self {
        match ms {
            0 => ReceiveTimeout::NonBlocking,
            ms if ms > 0 => ReceiveTimeout::After(Duration::from_millis(ms as u64)),
            _ => ReceiveTimeout::Forever,
        }
    }
}

impl From<i32> for ReceiveTimeout {
    fn from(ms: i32) -> Self {
        ReceiveTimeout::from(ms as i64)
    }
}

impl From<Duration> for ReceiveTimeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            ReceiveTimeout::NonBlocking
        } else {
            ReceiveTimeout::After(d)
        }
    }
}
