mod heartbeat;
mod helpers;
mod poll_cycle;
mod unsubscribe;
