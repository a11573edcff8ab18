use std::time::Duration;

use nng::{Protocol, Socket};

use crate::error::Result;
use crate::posture::PostureHooks;

/// Publishes posture events on an nng pub socket.
///
/// Messages are plain text: `bad_posture <seconds>` and `posture_restored`.
/// Subscribers that are not connected miss them.
pub struct NngNotifier {
    socket: Socket,
}

impl NngNotifier {
    pub fn bind(address: &str) -> Result<Self> {
        let socket = Socket::new(Protocol::Pub0)?;
        socket.listen(address)?;

        log::info!("Publishing posture events on {}", address);

        Ok(Self { socket })
    }

    fn publish(&self, msg: &str) {
        if let Err((_, e)) = self.socket.send(msg.as_bytes()) {
            log::warn!("Failed to publish {:?}: {}", msg, e);
        }
    }
}

impl PostureHooks for NngNotifier {
    fn on_sustained_bad_posture(&mut self, elapsed: Duration) {
        log::info!("Sustained bad posture ({:.1}s)", elapsed.as_secs_f32());
        self.publish(&format!("bad_posture {:.2}", elapsed.as_secs_f64()));
    }

    fn on_posture_restored(&mut self) {
        log::info!("Posture restored");
        self.publish("posture_restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nng::options::protocol::pubsub::Subscribe;
    use nng::options::{Options, RecvTimeout};

    #[test]
    fn subscriber_receives_events() {
        let address = "inproc://posture-watch/notify-test";
        let mut notifier = NngNotifier::bind(address).unwrap();

        let sub = Socket::new(Protocol::Sub0).unwrap();
        sub.set_opt::<Subscribe>(Vec::new()).unwrap();
        sub.set_opt::<RecvTimeout>(Some(Duration::from_secs(2))).unwrap();
        sub.dial(address).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        notifier.on_sustained_bad_posture(Duration::from_millis(15_500));
        let msg = sub.recv().unwrap();
        assert_eq!(msg.as_slice(), b"bad_posture 15.50");

        notifier.on_posture_restored();
        let msg = sub.recv().unwrap();
        assert_eq!(msg.as_slice(), b"posture_restored");
    }
}
