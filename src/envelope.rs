use std::collections::BTreeMap;

/// String attributes travelling next to a queue message body.
pub type MessageAttributes = BTreeMap<String, String>;

/// Message container exchanged with the queue.
///
/// `Envelope` bundles a message payload together with the string attributes
/// the queue carries alongside it. Attributes are visible to consumers without
/// decoding the payload, which is how the correlation id reaches the poller.
///
/// ## Conversion
///
/// `Envelope` implements `From<(MessageAttributes, M)>` for ergonomic
/// construction when attributes and payload are already available.
///
/// ## Example
///
/// ```rust
/// use pigeonhole::Envelope;
///
/// let envelope = Envelope::new("hello").with_attribute("correlationId", "abc-123");
///
/// assert_eq!(envelope.attribute("correlationId"), Some("abc-123"));
/// assert_eq!(envelope.attribute("sender"), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    /// Queue message attributes.
    pub attributes: MessageAttributes,
    /// Message payload.
    pub message: M,
}

impl<M> Envelope<M> {
    /// Wrap a payload with no attributes.
    pub fn new(message: M) -> Self {
        Self {
            attributes: MessageAttributes::new(),
            message,
        }
    }

    /// Attach a string attribute, replacing any previous value for `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Transform the payload while keeping the attributes.
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> Envelope<N> {
        Envelope {
            attributes: self.attributes,
            message: f(self.message),
        }
    }
}

impl<M> From<(MessageAttributes, M)> for Envelope<M> {
    fn from(value: (MessageAttributes, M)) -> Self {
        Envelope {
            attributes: value.0,
            message: value.1,
        }
    }
}
