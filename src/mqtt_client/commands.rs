// SPDX-License-Identifier: MPL-2.0

use tokio_util::sync::CancellationToken;

use crate::mqtt_serde::mqttv5::{
    common::properties::Property, publishv5::MqttPublish, subscribev5::TopicSubscription,
};

/// Fully customizable publish command for MQTT v5
#[derive(Debug, Clone)]
pub struct PublishCommand {
    pub topic_name: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub properties: Vec<Property>,
    /// Cancels this operation only; the client keeps running
    pub cancel_token: Option<CancellationToken>,
}

impl PublishCommand {
    pub fn simple(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: u8, retain: bool) -> Self {
        Self {
            topic_name: topic.into(),
            payload: payload.into(),
            qos,
            retain,
            properties: Vec::new(),
            cancel_token: None,
        }
    }

    /// Create a new builder for constructing a PublishCommand
    ///
    /// # Example
    /// ```no_run
    /// use mqtt5_engine::mqtt_client::commands::PublishCommand;
    ///
    /// let cmd = PublishCommand::builder()
    ///     .topic("sensors/temp")
    ///     .payload(b"23.5")
    ///     .qos(1)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> PublishCommandBuilder {
        PublishCommandBuilder::new()
    }

    /// The PUBLISH packet without a packet identifier.
    pub fn to_mqtt_publish(&self, packet_id: Option<u16>) -> MqttPublish {
        MqttPublish::new(
            self.qos,
            self.topic_name.clone(),
            packet_id,
            self.payload.clone(),
            self.retain,
            false,
        )
        .with_properties(self.properties.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishCommandBuilder {
    topic_name: Option<String>,
    payload: Vec<u8>,
    qos: u8,
    retain: bool,
    properties: Vec<Property>,
    cancel_token: Option<CancellationToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishBuilderError {
    /// Topic name was not provided
    NoTopic,
    InvalidQos(u8),
}

impl std::fmt::Display for PublishBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTopic => write!(f, "Topic name not provided. Call topic() to set the topic."),
            Self::InvalidQos(qos) => write!(f, "Invalid QoS {}. Must be 0, 1, or 2.", qos),
        }
    }
}

impl std::error::Error for PublishBuilderError {}

impl PublishCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_name = Some(topic.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn add_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_message_expiry_interval(mut self, seconds: u32) -> Self {
        self.properties
            .push(Property::MessageExpiryInterval(seconds));
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.properties
            .push(Property::ContentType(content_type.into()));
        self
    }

    pub fn with_response_topic(mut self, topic: impl Into<String>) -> Self {
        self.properties.push(Property::ResponseTopic(topic.into()));
        self
    }

    pub fn with_correlation_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.properties.push(Property::CorrelationData(data.into()));
        self
    }

    pub fn with_topic_alias(mut self, alias: u16) -> Self {
        self.properties.push(Property::TopicAlias(alias));
        self
    }

    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .push(Property::UserProperty(key.into(), value.into()));
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn build(self) -> Result<PublishCommand, PublishBuilderError> {
        let topic_name = self.topic_name.ok_or(PublishBuilderError::NoTopic)?;
        if self.qos > 2 {
            return Err(PublishBuilderError::InvalidQos(self.qos));
        }

        Ok(PublishCommand {
            topic_name,
            payload: self.payload,
            qos: self.qos,
            retain: self.retain,
            properties: self.properties,
            cancel_token: self.cancel_token,
        })
    }
}

/// Fully customizable subscribe command for MQTT v5
#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub subscriptions: Vec<TopicSubscription>,
    pub properties: Vec<Property>,
    pub cancel_token: Option<CancellationToken>,
}

impl SubscribeCommand {
    pub fn single(topic: impl Into<String>, qos: u8) -> Self {
        Self {
            subscriptions: vec![TopicSubscription::new_simple(topic.into(), qos)],
            properties: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn builder() -> SubscribeCommandBuilder {
        SubscribeCommandBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeCommandBuilder {
    topics: Vec<TopicSubscription>,
    properties: Vec<Property>,
    cancel_token: Option<CancellationToken>,
    error: Option<SubscribeBuilderError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeBuilderError {
    NoTopics,
    /// A per-topic option was set before any add_topic()
    OptionWithoutTopic(&'static str),
    InvalidRetainHandling(u8),
    InvalidQos(u8),
}

impl std::fmt::Display for SubscribeBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTopics => write!(
                f,
                "No topics added to subscription. Call add_topic() at least once."
            ),
            Self::OptionWithoutTopic(option) => write!(
                f,
                "Cannot set {}: no topics added yet. Call add_topic() first.",
                option
            ),
            Self::InvalidRetainHandling(rh) => write!(
                f,
                "Invalid retain_handling value: {}. Must be 0, 1, or 2.",
                rh
            ),
            Self::InvalidQos(qos) => write!(f, "Invalid QoS {}. Must be 0, 1, or 2.", qos),
        }
    }
}

impl std::error::Error for SubscribeBuilderError {}

impl SubscribeCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic(mut self, topic: impl Into<String>, qos: u8) -> Self {
        self.topics
            .push(TopicSubscription::new_simple(topic.into(), qos));
        self
    }

    pub fn add_topic_with_options(
        mut self,
        topic: impl Into<String>,
        qos: u8,
        no_local: bool,
        retain_as_published: bool,
        retain_handling: u8,
    ) -> Self {
        self.topics.push(TopicSubscription::new(
            topic.into(),
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        ));
        self
    }

    fn with_last(
        mut self,
        option: &'static str,
        f: impl FnOnce(&mut TopicSubscription),
    ) -> Self {
        match self.topics.last_mut() {
            Some(last) => f(last),
            None => {
                self.error
                    .get_or_insert(SubscribeBuilderError::OptionWithoutTopic(option));
            }
        }
        self
    }

    pub fn with_no_local(self, no_local: bool) -> Self {
        self.with_last("no_local", |s| s.no_local = no_local)
    }

    pub fn with_retain_as_published(self, rap: bool) -> Self {
        self.with_last("retain_as_published", |s| s.retain_as_published = rap)
    }

    pub fn with_retain_handling(self, rh: u8) -> Self {
        self.with_last("retain_handling", |s| s.retain_handling = rh)
    }

    pub fn with_subscription_id(mut self, id: u32) -> Self {
        self.properties.push(Property::SubscriptionIdentifier(id));
        self
    }

    pub fn add_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn build(self) -> Result<SubscribeCommand, SubscribeBuilderError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.topics.is_empty() {
            return Err(SubscribeBuilderError::NoTopics);
        }
        for sub in &self.topics {
            if sub.qos > 2 {
                return Err(SubscribeBuilderError::InvalidQos(sub.qos));
            }
            if sub.retain_handling > 2 {
                return Err(SubscribeBuilderError::InvalidRetainHandling(
                    sub.retain_handling,
                ));
            }
        }

        Ok(SubscribeCommand {
            subscriptions: self.topics,
            properties: self.properties,
            cancel_token: self.cancel_token,
        })
    }
}

/// Fully customizable unsubscribe command for MQTT v5
#[derive(Debug, Clone)]
pub struct UnsubscribeCommand {
    pub topics: Vec<String>,
    pub properties: Vec<Property>,
    pub cancel_token: Option<CancellationToken>,
}

impl UnsubscribeCommand {
    pub fn new(topics: Vec<String>, properties: Vec<Property>) -> Self {
        Self {
            topics,
            properties,
            cancel_token: None,
        }
    }

    pub fn from_topics(topics: Vec<String>) -> Self {
        Self::new(topics, Vec::new())
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}
