//! The injected MIME boundary.
//!
//! Message objects, multiparts, and content handlers live in the host
//! application. The engine needs exactly three things from a message: a
//! serialized RFC 5322 rendition for DATA, a walk over its leaf parts for
//! the 8BITMIME conversion, and the ability to re-attach a converted part
//! as 8bit.

/// One leaf body part of a message.
pub trait MimePart {
    /// The Content-Transfer-Encoding token, e.g. `quoted-printable`.
    fn transfer_encoding(&self) -> String;

    /// The decoded content bytes.
    ///
    /// # Errors
    ///
    /// Returns a message when the encoded content cannot be decoded.
    fn decoded_content(&self) -> Result<Vec<u8>, String>;

    /// Re-attaches `content` as the part's body under the original
    /// content type, with `Content-Transfer-Encoding: 8bit`.
    fn attach_8bit(&mut self, content: Vec<u8>);
}

/// A message handed to the transport for sending.
pub trait MimeMessage {
    /// Visits every leaf part, depth first.
    fn for_each_part(&mut self, visit: &mut dyn FnMut(&mut dyn MimePart));

    /// Serializes the message to RFC 5322 bytes (header block, blank
    /// line, body). Line endings need not be canonical; the DATA writer
    /// canonicalises to CRLF.
    ///
    /// # Errors
    ///
    /// Returns a message when the object cannot be serialized.
    fn write_to(&self) -> Result<Vec<u8>, String>;
}
