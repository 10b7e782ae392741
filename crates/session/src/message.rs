/// Who produced a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Ai,
    /// Locally generated status or error text.
    System,
}

/// One chat line. Never mutated once it is in a [`MessageLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }
}

/// Append-only message sequence. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended at or after `index`; empty when `index` is past the end.
    pub fn since(&self, index: usize) -> &[Message] {
        self.messages.get(index..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn count_from(&self, sender: Sender) -> usize {
        self.messages
            .iter()
            .filter(|message| message.sender == sender)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_returns_tail_and_tolerates_overshoot() {
        let mut log = MessageLog::new();
        log.push(Message::system("ready"));
        log.push(Message::user("hello"));
        log.push(Message::ai("hi"));

        assert_eq!(log.since(1), &[Message::user("hello"), Message::ai("hi")]);
        assert!(log.since(3).is_empty());
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn count_from_filters_by_sender() {
        let mut log = MessageLog::new();
        log.push(Message::system("a"));
        log.push(Message::user("b"));
        log.push(Message::system("c"));

        assert_eq!(log.count_from(Sender::System), 2);
        assert_eq!(log.count_from(Sender::Ai), 0);
    }
}
