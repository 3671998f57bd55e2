//! Communication boundary traits
//!
//! The session engine never talks to sockets directly. Outbound protocol
//! lines travel through a [`Tunnel`] resolved per participant name by a
//! `tunnel_finder` closure, and connection-level operations (deleting a
//! computer participant's client, kicking or banning a human) go through a
//! [`ClientGateway`]. Implementations may be backed by WebSockets, an
//! in-process bus or test doubles; sends must never block state progression.

/// Trait for sending protocol lines through a communication tunnel
pub trait Tunnel {
    /// Sends one encoded protocol message to the client
    fn send(&self, text: &str);

    /// Closes the communication tunnel
    ///
    /// Called when the participant leaves or the session shuts down.
    fn close(self);
}

/// Trait for connection-fabric operations the session cannot perform itself
pub trait ClientGateway {
    /// Removes a client endpoint by name
    ///
    /// # Returns
    ///
    /// `true` if a client with that name existed and was removed.
    fn delete_client(&mut self, name: &str) -> bool;

    /// Whether a client endpoint with this name is present
    fn contains(&self, name: &str) -> bool;

    /// Forcibly disconnects a human participant, optionally blacklisting them
    fn kick(&mut self, name: &str, ban: bool);
}
