use amq_protocol_types::ShortString;
use lapin::message::Delivery;
use lapin::BasicProperties;
use uuid::Uuid;

/// Envelope for request messages sent over the message bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Unique identifier of the request. The response carries the same id so
    /// the two can be matched.
    pub correlation_id: Option<String>,
    /// Queue where the sender expects the response to be published.
    pub response_queue_name: Option<String>,
    /// Raw message content.
    pub message: Vec<u8>,
}

impl RequestEnvelope {
    pub fn new(
        correlation_id: Option<String>,
        response_queue_name: Option<String>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            correlation_id,
            response_queue_name,
            message: message.into(),
        }
    }

    /// A message for which no response is expected.
    pub fn fire_and_forget(message: impl Into<Vec<u8>>) -> Self {
        Self::new(None, None, message)
    }

    /// A request with a fresh correlation id, answered on `response_queue_name`.
    pub fn request(message: impl Into<Vec<u8>>, response_queue_name: impl Into<String>) -> Self {
        Self::new(
            Some(Uuid::new_v4().to_string()),
            Some(response_queue_name.into()),
            message,
        )
    }

    pub fn expects_response(&self) -> bool {
        self.response_queue_name.is_some()
    }

    /// Builds the response to this request: the queue to publish it on and an
    /// envelope carrying the request's correlation id. `None` when the sender
    /// did not ask for a response.
    pub fn reply(&self, message: impl Into<Vec<u8>>) -> Option<(String, RequestEnvelope)> {
        let queue = self.response_queue_name.clone()?;
        Some((queue, Self::new(self.correlation_id.clone(), None, message)))
    }

    /// AMQP properties, only setting what the envelope carries.
    pub fn properties(&self) -> BasicProperties {
        let mut properties = BasicProperties::default();
        if let Some(correlation_id) = &self.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id.clone()));
        }
        if let Some(reply_to) = &self.response_queue_name {
            properties = properties.with_reply_to(ShortString::from(reply_to.clone()));
        }
        properties
    }

    pub fn from_properties(properties: &BasicProperties, message: Vec<u8>) -> Self {
        Self {
            correlation_id: properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            response_queue_name: properties
                .reply_to()
                .as_ref()
                .map(|queue| queue.as_str().to_string()),
            message,
        }
    }
}

impl From<&Delivery> for RequestEnvelope {
    fn from(delivery: &Delivery) -> Self {
        Self::from_properties(&delivery.properties, delivery.data.clone())
    }
}
