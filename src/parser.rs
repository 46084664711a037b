//! Parsing front-end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::cleaner;
use crate::engine::{ByteReader, RawParser};
use crate::language::Language;
use crate::text::Text;
use crate::tree::Tree;

/// Bytes handed to the engine per read callback.
const READ_BUFFER_CAPACITY: usize = 1024 * 1024;

/// A reusable parser for one language.
///
/// The native session behind it is single-threaded, so concurrent `parse`
/// calls on one `Parser` serialize on an internal lock. The read buffer is
/// allocated once and reused across parses.
pub struct Parser {
    language: Language,
    session: Mutex<ParserSession>,
}

struct ParserSession {
    // `Option` so `Drop` can move the boxed session to the cleaner thread.
    raw: Option<Box<dyn RawParser>>,
    buffer: Vec<u8>,
}

impl Parser {
    pub fn new(language: &Language) -> Parser {
        Parser {
            language: language.clone(),
            session: Mutex::new(ParserSession {
                raw: Some(language.engine().new_parser()),
                buffer: vec![0; READ_BUFFER_CAPACITY],
            }),
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Parse `text`, reusing unchanged structure from `prior` when given.
    ///
    /// `prior` should be the previous tree adjusted for the edits that
    /// produced `text` (see [`Tree::adjust`]). Passing a still-actual prior
    /// tree means the text has not changed, and that tree is returned as is.
    ///
    /// Returns `None` when the parse was cancelled through `token`, either
    /// before it started or while it ran. A tree completed before the
    /// cancellation was observed is released, not returned.
    pub fn parse<T: Text + ?Sized>(
        &self,
        text: &T,
        prior: Option<&Tree>,
        token: Option<&CancellationToken>,
    ) -> Option<Tree> {
        if prior.is_some_and(|p| p.is_actual()) {
            return prior.cloned();
        }

        let mut session = self.session.lock();
        let session = &mut *session;
        let raw = session
            .raw
            .get_or_insert_with(|| self.language.engine().new_parser());

        let cancel_flag = Arc::new(AtomicBool::new(false));
        if let Some(token) = token {
            let flag = cancel_flag.clone();
            token.on_cancel(move || flag.store(true, Ordering::SeqCst));
            if token.cancelled() {
                return None;
            }
        }

        debug!(
            language = self.language.name(),
            incremental = prior.is_some(),
            "parsing"
        );

        let mut reader = TextReader {
            text,
            buffer: &mut session.buffer,
        };
        let result = raw.parse(
            &mut reader,
            text.encoding(),
            prior.map(|t| t.raw()),
            &cancel_flag,
        );
        raw.reset();
        let raw_tree = result?;

        // The engine may finish a parse before it notices a late
        // cancellation; that tree must not surface.
        if cancel_flag.load(Ordering::SeqCst) {
            cleaner::schedule(Box::new(move || drop(raw_tree)));
            return None;
        }

        Some(Tree::new(raw_tree, self.language.clone(), true))
    }
}

impl Drop for Parser {
    fn drop(&mut self) {
        if let Some(raw) = self.session.get_mut().raw.take() {
            cleaner::schedule(Box::new(move || drop(raw)));
        }
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("language", &self.language.name())
            .finish()
    }
}

/// Adapts the pull-based [`Text`] source to the engine's streaming reads.
struct TextReader<'a, T: ?Sized> {
    text: &'a T,
    buffer: &'a mut Vec<u8>,
}

impl<T: Text + ?Sized> ByteReader for TextReader<'_, T> {
    fn read(&mut self, byte_offset: u32) -> &[u8] {
        let n = self.text.read(byte_offset, self.buffer);
        &self.buffer[..n]
    }
}
