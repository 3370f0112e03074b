use std::time::{Duration, Instant};

use actix_ws::Message;
use campusconnect_directory::UserProfile;
use campusconnect_ws::{JoinPolicy, RelayContext};
use futures_util::{
    StreamExt as _,
    future::{Either, select},
};
use log::{debug, error};
use serde_json::Value;
use tokio::{pin, sync::mpsc, time::interval};

use crate::ws::server::RelayServerHandle;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one authenticated relay connection: registers it, joins its
/// default rooms, then pumps inbound events into the relay and relayed
/// events back out until the client goes away.
pub async fn relay_ws(
    relay_server: RelayServerHandle,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    profile: UserProfile,
    join_policy: JoinPolicy,
) {
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();

    let conn_id = relay_server.connect(&profile, conn_tx).await;

    log::info!("Connection id: {conn_id}");

    let context = RelayContext {
        connection_id: conn_id.to_string(),
        identity: profile,
        join_policy,
    };

    if let Err(error) = campusconnect_ws::connect(&relay_server, &context).await {
        error!("Failed to join default rooms for {conn_id}: {error:?}");
        relay_server.disconnect(conn_id);
        return;
    }

    let mut last_heartbeat = Instant::now();
    let mut interval = interval(HEARTBEAT_INTERVAL);

    let close_reason = loop {
        // most of the futures we process need to be stack-pinned to work with select()

        let tick = interval.tick();
        pin!(tick);

        let msg_rx = conn_rx.recv();
        pin!(msg_rx);

        let messages = select(msg_stream.next(), msg_rx);
        pin!(messages);

        match select(messages, tick).await {
            // commands & messages received from client
            Either::Left((Either::Left((Some(Ok(msg)), _)), _)) => match msg {
                Message::Ping(bytes) => {
                    last_heartbeat = Instant::now();
                    if session.pong(&bytes).await.is_err() {
                        break None;
                    }
                }

                Message::Pong(_) => {
                    last_heartbeat = Instant::now();
                }

                Message::Text(text) => {
                    last_heartbeat = Instant::now();

                    match serde_json::from_str::<Value>(text.as_ref()) {
                        Ok(body) => {
                            // a bad event is logged and dropped; the
                            // connection stays open
                            if let Err(error) =
                                campusconnect_ws::process_message(body, &context, &relay_server)
                                    .await
                            {
                                error!("Failed to process message from {conn_id}: {error:?}");
                            }
                        }
                        Err(error) => {
                            error!("Invalid payload from {conn_id}: {error:?}");
                        }
                    }
                }

                Message::Binary(_) => {
                    last_heartbeat = Instant::now();
                    debug!("Ignoring binary message from {conn_id}");
                }

                Message::Close(reason) => break reason,

                _ => {
                    break None;
                }
            },

            // client WebSocket stream error
            Either::Left((Either::Left((Some(Err(err)), _)), _)) => {
                error!("{}", err);
                break None;
            }

            // client WebSocket stream ended
            Either::Left((Either::Left((None, _)), _)) => break None,

            // relayed events for this connection from other room members
            Either::Left((Either::Right((Some(relay_msg), _)), _)) => {
                if session.text(relay_msg).await.is_err() {
                    break None;
                }
            }

            // all connection's message senders were dropped; relay server is
            // shutting down
            Either::Left((Either::Right((None, _)), _)) => break None,

            // heartbeat internal tick
            Either::Right((_inst, _)) => {
                // if no heartbeat ping/pong received recently, close the connection
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    log::info!(
                        "client has not sent heartbeat in over {CLIENT_TIMEOUT:?}; disconnecting"
                    );
                    break None;
                }

                // send heartbeat ping
                let _ = session.ping(b"").await;
            }
        };
    };

    relay_server.disconnect(conn_id);

    // attempt to close connection gracefully
    let _ = session.close(close_reason).await;
}
