//! The seam between this reader and the external byte-level parser.
//!
//! Walking the on-disk datagram framing (lengths, type tags, checksums) is
//! the parser's job; everything this crate consumes is an already
//! discriminated [`DatagramRecord`]. A parser is opened per file by the
//! caller and handed to [`crate::EchoData::read_raw`] through this trait.
use echogram_core::datagram_structs::DatagramRecord;
use echogram_core::errors::EchoError;

/// A stream of parsed datagrams from one raw file, in file order.
pub trait DatagramSource {
    /// Produce the next record, or `None` once the file is exhausted.
    /// Parser-detected corruption surfaces as [`EchoError::DatagramParse`]
    /// and is propagated to the caller as-is.
    fn next_record(&mut self) -> Result<Option<DatagramRecord>, EchoError>;
}

/// Adapter making any iterator of parsed records a [`DatagramSource`].
pub struct IterSource<I> {
    inner: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Result<DatagramRecord, EchoError>>,
{
    pub fn new(inner: I) -> Self {
        IterSource { inner }
    }
}

impl<I> DatagramSource for IterSource<I>
where
    I: Iterator<Item = Result<DatagramRecord, EchoError>>,
{
    fn next_record(&mut self) -> Result<Option<DatagramRecord>, EchoError> {
        self.inner.next().transpose()
    }
}
