//! Argument cursor over the remainder of a command line.
//!
//! Tokens are separated by spaces or tabs. Every accessor reports one of three
//! outcomes through [`ArgMatch`]; `Absent` never moves the cursor, so a handler
//! can probe for an optional argument and fall back to showing the current value.

use crate::settings::clip_to_boundary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMatch<T> {
    Matched(T),
    /// No token left.
    Absent,
    /// A token was present but unusable; it has been consumed.
    Invalid,
}

impl<T> ArgMatch<T> {
    pub fn matched(self) -> Option<T> {
        match self {
            ArgMatch::Matched(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    rest: &'a str,
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

impl<'a> Args<'a> {
    pub fn new(rest: &'a str) -> Self {
        Args { rest }
    }

    fn split_next(&self) -> Option<(&'a str, &'a str)> {
        let trimmed = self.rest.trim_start_matches(is_separator);
        if trimmed.is_empty() {
            return None;
        }
        let end = trimmed.find(is_separator).unwrap_or(trimmed.len());
        Some((&trimmed[..end], &trimmed[end..]))
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.split_next().map(|(token, _)| token)
    }

    pub fn next_token(&mut self) -> Option<&'a str> {
        let (token, rest) = self.split_next()?;
        self.rest = rest;
        Some(token)
    }

    pub fn is_empty(&self) -> bool {
        self.split_next().is_none()
    }

    /// Everything not yet consumed, untrimmed.
    pub fn remaining(&self) -> &'a str {
        self.rest
    }

    /// Case-sensitive whole-token match; yields the candidate's index.
    pub fn match_one_of(&mut self, candidates: &[&str]) -> ArgMatch<usize> {
        let Some(token) = self.next_token() else {
            return ArgMatch::Absent;
        };
        match candidates.iter().position(|c| *c == token) {
            Some(i) => ArgMatch::Matched(i),
            None => ArgMatch::Invalid,
        }
    }

    pub fn parse_uint(&mut self, min: u64, max: u64) -> ArgMatch<u64> {
        self.parse_uint_radix(min, max, 10)
    }

    /// Unsigned integer in `radix` within `min..=max`. Signs, prefixes and
    /// overflow are all `Invalid`.
    pub fn parse_uint_radix(&mut self, min: u64, max: u64, radix: u32) -> ArgMatch<u64> {
        let Some(token) = self.next_token() else {
            return ArgMatch::Absent;
        };
        if !token.chars().all(|c| c.is_digit(radix)) {
            return ArgMatch::Invalid;
        }
        match u64::from_str_radix(token, radix) {
            Ok(v) if (min..=max).contains(&v) => ArgMatch::Matched(v),
            _ => ArgMatch::Invalid,
        }
    }

    /// The trimmed remainder, clipped to `max_len` bytes. Consumes everything.
    pub fn rest_of_line(&mut self, max_len: usize) -> ArgMatch<&'a str> {
        let text = self.rest.trim_matches(is_separator);
        if text.is_empty() {
            return ArgMatch::Absent;
        }
        self.rest = "";
        ArgMatch::Matched(clip_to_boundary(text, max_len))
    }
}
