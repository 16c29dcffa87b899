//! Classification of `lapin` errors into [`BrokerError`].
//!
//! This is the only place that inspects client errors. The core decides
//! retries and reconnects from the resulting kind alone.

use channelog_core::BrokerError;
use lapin::protocol::AMQPErrorKind;
use lapin::Error as LapinError;

/// Broker operation an error was raised by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation<'a> {
    Dial,
    OpenChannel,
    DeclareQueue(&'a str),
    Publish,
    Close,
}

/// Map a client error onto the broker error taxonomy
pub(crate) fn classify(err: &LapinError, operation: Operation<'_>) -> BrokerError {
    let message = err.to_string();

    if operation == Operation::Dial {
        return BrokerError::Dial(message);
    }

    match err {
        LapinError::InvalidConnectionState(_)
        | LapinError::IOError(_)
        | LapinError::MissingHeartbeatError => BrokerError::ConnectionClosed(message),
        LapinError::InvalidChannelState(_) | LapinError::InvalidChannel(_) => {
            BrokerError::ChannelClosed(message)
        }
        LapinError::ProtocolError(amqp) if matches!(amqp.kind(), AMQPErrorKind::Hard(_)) => {
            BrokerError::ConnectionClosed(message)
        }
        _ => match operation {
            Operation::OpenChannel => BrokerError::ChannelOpen(message),
            Operation::DeclareQueue(queue) => BrokerError::queue_declare(queue, message),
            Operation::Publish => BrokerError::Publish(message),
            Operation::Dial | Operation::Close => BrokerError::ChannelClosed(message),
        },
    }
}

/// True for errors that only mean the resource was already closed
pub(crate) fn is_already_closed(err: &LapinError) -> bool {
    matches!(
        err,
        LapinError::InvalidConnectionState(_)
            | LapinError::InvalidChannelState(_)
            | LapinError::InvalidChannel(_)
    )
}
