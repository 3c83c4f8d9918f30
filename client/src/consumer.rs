use shared::Position;

/// Receives every position the server pushes.
///
/// Called from the connection task itself, so implementations must return
/// quickly. Anything slow (drawing, I/O) belongs behind a channel.
pub trait PositionConsumer: Send + Sync + 'static {
    fn on_position(&self, position: Position);
}

impl<F> PositionConsumer for F
where
    F: Fn(Position) + Send + Sync + 'static,
{
    fn on_position(&self, position: Position) {
        self(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let consumer = move |pos: Position| sink.lock().unwrap().push(pos);

        consumer.on_position(Position::new(30, 20));
        consumer.on_position(Position::new(40, 20));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Position::new(30, 20), Position::new(40, 20)]
        );
    }
}
