//! Range-bounded syntax walks for editor highlighting.

use text_size::{TextRange, TextSize};

use crate::zipper::Zipper;

/// Walk the visible nodes intersecting `range` in document order, folding an
/// accumulator.
///
/// Starting from `zipper` (typically a tree's root, or a resume point from a
/// previous call):
///
/// * nodes entirely before the range are skipped as whole subtrees, and
///   `skip` is told how far the walk jumped;
/// * nodes straddling a range boundary are descended into without being
///   reported, so only spans fully inside the range reach `highlight`;
/// * a node fully inside the range is passed to `highlight`, then the walk
///   descends into it (inner spans are reported after their parent).
///
/// Stops at the first node starting at or past the range end and returns it
/// as the resume point; returns `None` instead when the walk ran off the end
/// of the tree.
pub fn highlight_syntax<A>(
    zipper: Zipper,
    range: TextRange,
    mut acc: A,
    mut skip: impl FnMut(A, TextSize) -> A,
    mut highlight: impl FnMut(A, &Zipper) -> A,
) -> (A, Option<Zipper>) {
    let mut cur = zipper;
    loop {
        let span = cur.byte_range();
        if span.start() >= range.end() {
            return (acc, Some(cur));
        }
        let next = if span.end() <= range.start() {
            acc = skip(acc, span.end());
            cur.skip()
        } else if span.start() < range.start() || span.end() > range.end() {
            cur.next()
        } else {
            acc = highlight(acc, &cur);
            cur.next()
        };
        match next {
            Some(z) => cur = z,
            None => return (acc, None),
        }
    }
}
