use crate::message::Message;

pub const DEFAULT_FORMAT: &str = "%v";

pub const FORMAT_HELP: &str = "available format tokens:
%t : topic
%p : partition
%o : offset
%e : timestamp (epoch seconds)
%k : message key
%v : message value
example format string: 'received %v from %t'";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Topic,
    Partition,
    Offset,
    Timestamp,
    Key,
    Value,
}

/// Renders messages with a template. The template is parsed once, so values
/// substituted into the output are never scanned for tokens themselves.
#[derive(Debug, Clone)]
pub struct Formatter {
    segments: Vec<Segment>,
}

impl Formatter {
    pub fn new(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let token = match (c, chars.peek()) {
                ('%', Some('t')) => Segment::Topic,
                ('%', Some('p')) => Segment::Partition,
                ('%', Some('o')) => Segment::Offset,
                ('%', Some('e')) => Segment::Timestamp,
                ('%', Some('k')) => Segment::Key,
                ('%', Some('v')) => Segment::Value,
                _ => {
                    literal.push(c);
                    continue;
                }
            };
            chars.next();

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(token);
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn format(&self, message: &Message) -> String {
        let mut out = String::with_capacity(message.value.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Topic => out.push_str(&message.topic),
                Segment::Partition => out.push_str(&message.partition.to_string()),
                Segment::Offset => out.push_str(&message.offset.to_string()),
                Segment::Timestamp => out.push_str(&message.timestamp.timestamp().to_string()),
                Segment::Key => {
                    if let Some(key) = &message.key {
                        out.push_str(&String::from_utf8_lossy(key));
                    }
                }
                Segment::Value => out.push_str(&String::from_utf8_lossy(&message.value)),
            }
        }

        out
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(DEFAULT_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn order_message() -> Message {
        Message {
            topic: "orders".to_string(),
            partition: 2,
            offset: 17,
            timestamp: DateTime::<Utc>::from_timestamp_millis(1_552_555_613_250).unwrap(),
            key: Some(b"id1".to_vec()),
            value: b"paid".to_vec(),
        }
    }

    #[test]
    fn substitutes_every_token() {
        let formatter = Formatter::new("%t/%p/%o: %k=%v");
        assert_eq!(formatter.format(&order_message()), "orders/2/17: id1=paid");
    }

    #[test]
    fn timestamp_is_rendered_in_epoch_seconds() {
        let formatter = Formatter::new("at %e");
        assert_eq!(formatter.format(&order_message()), "at 1552555613");
    }

    #[test]
    fn repeated_tokens_are_all_replaced() {
        let formatter = Formatter::new("%v %v %t");
        assert_eq!(formatter.format(&order_message()), "paid paid orders");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let formatter = Formatter::new("100% %x %%v %");
        assert_eq!(formatter.format(&order_message()), "100% %x %paid %");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let mut message = order_message();
        message.value = b"literal %t".to_vec();

        let formatter = Formatter::new("%v");
        assert_eq!(formatter.format(&message), "literal %t");
    }

    #[test]
    fn missing_key_renders_empty() {
        let mut message = order_message();
        message.key = None;

        let formatter = Formatter::new("[%k] %v");
        assert_eq!(formatter.format(&message), "[] paid");
    }

    #[test]
    fn default_format_prints_the_value() {
        assert_eq!(Formatter::default().format(&order_message()), "paid");
    }
}
