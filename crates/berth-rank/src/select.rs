//! Consumers that pick placements from a ranked stream.

use crate::error::RankResult;
use crate::rank::{RankIterator, RankedNode};

/// Passes through at most `limit` nodes, then ends the stream.
///
/// Bounds how many candidates an evaluation scores when the cluster is large.
pub struct LimitIterator<S> {
    source: S,
    limit: usize,
    seen: usize,
}

impl<S: RankIterator> LimitIterator<S> {
    pub fn new(source: S, limit: usize) -> Self {
        Self {
            source,
            limit,
            seen: 0,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }
}

impl<S: RankIterator> RankIterator for LimitIterator<S> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        if self.seen >= self.limit {
            return Ok(None);
        }
        let option = self.source.next()?;
        if option.is_some() {
            self.seen += 1;
        }
        Ok(option)
    }

    fn reset(&mut self) {
        self.source.reset();
        self.seen = 0;
    }
}

/// Drains its upstream and yields only the highest scoring node.
///
/// Ties go to the node seen first.
pub struct MaxScoreIterator<S> {
    source: S,
    done: bool,
}

impl<S: RankIterator> MaxScoreIterator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            done: false,
        }
    }
}

impl<S: RankIterator> RankIterator for MaxScoreIterator<S> {
    fn next(&mut self) -> RankResult<Option<RankedNode>> {
        if self.done {
            return Ok(None);
        }

        let mut max: Option<RankedNode> = None;
        while let Some(option) = self.source.next()? {
            if max.as_ref().is_none_or(|m| option.score > m.score) {
                max = Some(option);
            }
        }
        self.done = true;
        Ok(max)
    }

    fn reset(&mut self) {
        self.source.reset();
        self.done = false;
    }
}
