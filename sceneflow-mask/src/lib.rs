// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity bit sets over an output's elements, and the masked-output
//! keys built on top of them.
//!
//! [`Mask`] is the innermost hot data structure of the execution core: every
//! traversal, cache key, and buffer merge goes through it. Two masks compare
//! equal iff their bit contents are equal; capacity is a property of the
//! producing output, not of the request, so masks of different capacities
//! are never compared to each other.

#![no_std]
#![cfg_attr(not(feature = "std"), doc(hidden))]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

mod masked_output;
mod masked_output_vector;

pub use masked_output::{MaskedOutput, OutputId};
pub use masked_output_vector::{MaskedOutputVector, hash_masked_output_vector};

use alloc::vec;
use alloc::vec::Vec;
use core::hash::{Hash, Hasher};

const BITS_PER_WORD: usize = u64::BITS as usize;

/// A fixed-capacity bit set over an output's elements.
///
/// Backed by packed `u64` words. Capacity is fixed at construction and never
/// changes; operations between masks of differing capacity panic, since
/// comparing masks across producing outputs of different element counts is
/// always a programming error.
#[derive(Clone, Debug, Eq)]
pub struct Mask {
    capacity: usize,
    words: Vec<u64>,
}

impl Mask {
    /// Creates an empty mask (no bits set) of the given element `capacity`.
    #[must_use]
    pub fn empty(capacity: usize) -> Self {
        Self {
            capacity,
            words: vec![0u64; words_for(capacity)],
        }
    }

    /// Creates an all-ones mask (every element set) of the given element
    /// `capacity`.
    #[must_use]
    pub fn all_ones(capacity: usize) -> Self {
        let mut mask = Self::empty(capacity);
        for word in &mut mask.words {
            *word = u64::MAX;
        }
        mask.mask_trailing_bits();
        mask
    }

    /// Returns the element capacity of this mask.
    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sets the bit at `index`. Panics if `index >= capacity()`.
    pub fn set(&mut self, index: usize) {
        self.assert_in_range(index);
        self.words[index / BITS_PER_WORD] |= 1u64 << (index % BITS_PER_WORD);
    }

    /// Clears the bit at `index`. Panics if `index >= capacity()`.
    pub fn clear(&mut self, index: usize) {
        self.assert_in_range(index);
        self.words[index / BITS_PER_WORD] &= !(1u64 << (index % BITS_PER_WORD));
    }

    /// Returns `true` if the bit at `index` is set. Panics if `index >=
    /// capacity()`.
    #[must_use]
    pub fn test(&self, index: usize) -> bool {
        self.assert_in_range(index);
        self.words[index / BITS_PER_WORD] & (1u64 << (index % BITS_PER_WORD)) != 0
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns the index of the first set bit, if any.
    #[must_use]
    pub fn first_set(&self) -> Option<usize> {
        for (word_index, &word) in self.words.iter().enumerate() {
            if word != 0 {
                return Some(word_index * BITS_PER_WORD + word.trailing_zeros() as usize);
            }
        }
        None
    }

    /// Returns the index of the last set bit, if any.
    #[must_use]
    pub fn last_set(&self) -> Option<usize> {
        for (word_index, &word) in self.words.iter().enumerate().rev() {
            if word != 0 {
                let bit = BITS_PER_WORD - 1 - word.leading_zeros() as usize;
                return Some(word_index * BITS_PER_WORD + bit);
            }
        }
        None
    }

    /// Returns an iterator over the indices of set bits, in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            SetBitsInWord { word, base: word_index * BITS_PER_WORD }
        })
    }

    /// Returns the union of `self` and `other`. Panics on capacity mismatch.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a | b)
    }

    /// Returns the intersection of `self` and `other`. Panics on capacity
    /// mismatch.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a & b)
    }

    /// Returns `self` with every bit in `other` cleared. Panics on capacity
    /// mismatch.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a & !b)
    }

    /// Unions `other` into `self` in place. Panics on capacity mismatch.
    pub fn union_with(&mut self, other: &Self) {
        self.assert_same_capacity(other);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Returns `true` if `self` and `other` share at least one set bit.
    /// Panics on capacity mismatch.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.assert_same_capacity(other);
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// A cheap, order-insensitive-within-word hash, sampling only the first
    /// and last words rather than hashing the full bit vector. This mirrors
    /// the source engine's `TfBits::FastHash`, which trades hash quality for
    /// speed on the hot cache-key path.
    #[must_use]
    pub fn fast_hash(&self) -> u64 {
        let mut hasher = FastHasher::default();
        self.capacity.hash(&mut hasher);
        match self.words.len() {
            0 => {}
            1 => self.words[0].hash(&mut hasher),
            _ => {
                self.words[0].hash(&mut hasher);
                self.words[self.words.len() - 1].hash(&mut hasher);
                (self.words.len() as u64).hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn combine(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        self.assert_same_capacity(other);
        let words = self.words.iter().zip(&other.words).map(|(&a, &b)| op(a, b)).collect();
        Self { capacity: self.capacity, words }
    }

    fn mask_trailing_bits(&mut self) {
        let used_bits = self.capacity % BITS_PER_WORD;
        if used_bits != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= (1u64 << used_bits) - 1;
        }
    }

    fn assert_in_range(&self, index: usize) {
        assert!(
            index < self.capacity,
            "mask index {index} out of range for capacity {}",
            self.capacity
        );
    }

    fn assert_same_capacity(&self, other: &Self) {
        assert!(
            self.capacity == other.capacity,
            "mask capacity mismatch: {} vs {}",
            self.capacity,
            other.capacity
        );
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity && self.words == other.words
    }
}

impl Hash for Mask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.capacity.hash(state);
        self.words.hash(state);
    }
}

struct SetBitsInWord {
    word: u64,
    base: usize,
}

impl Iterator for SetBitsInWord {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.word == 0 {
            return None;
        }
        let bit = self.word.trailing_zeros() as usize;
        self.word &= self.word - 1;
        Some(self.base + bit)
    }
}

#[inline]
const fn words_for(capacity: usize) -> usize {
    capacity.div_ceil(BITS_PER_WORD)
}

/// A small, dependency-free FNV-1a hasher used for [`Mask::fast_hash`] so
/// this crate's hot path does not need `std`'s `RandomState`.
#[derive(Default)]
struct FastHasher {
    state: u64,
}

impl Hasher for FastHasher {
    fn finish(&self) -> u64 {
        if self.state == 0 { 0xcbf2_9ce4_8422_2325 } else { self.state }
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut hash = if self.state == 0 { 0xcbf2_9ce4_8422_2325 } else { self.state };
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        self.state = hash;
    }
}
