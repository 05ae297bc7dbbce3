// MinIO Rust Library for Amazon S3 Compatible Cloud Storage
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::s3::utils::url_encode;
use std::borrow::Cow;

/// Multimap for string key and string value
pub type Multimap = multimap::MultiMap<String, String>;

/// Collapses multiple spaces into a single space and trims the value.
///
/// Returns `Cow::Borrowed` when no transformation beyond trimming is needed.
#[inline]
pub(crate) fn collapse_spaces(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    if !trimmed.contains("  ") {
        return Cow::Borrowed(trimmed);
    }
    let mut result = String::with_capacity(trimmed.len());
    let mut prev_space = false;
    for c in trimmed.chars() {
        if c == ' ' {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(c);
            prev_space = false;
        }
    }
    Cow::Owned(result)
}

pub trait MultimapExt {
    /// Adds a key-value pair to the multimap
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V);

    /// Adds a multimap to the current multimap
    fn add_multimap(&mut self, other: Multimap);

    /// Returns the values stored under `key`, compared case-insensitively.
    /// Values of one key keep their insertion order; keys that differ only
    /// in case follow each other in sorted order.
    fn get_all_ignore_case(&self, key: &str) -> Vec<&str>;

    /// Returns `true` if any key matches `key` case-insensitively
    fn contains_key_ignore_case(&self, key: &str) -> bool;

    /// Removes every key matching `key` case-insensitively
    fn remove_ignore_case(&mut self, key: &str);

    /// Converts multimap to HTTP query string
    fn to_query_string(&self) -> String;

    /// Converts multimap to canonical query string
    fn get_canonical_query_string(&self) -> String;
}

impl MultimapExt for Multimap {
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.insert(key.into(), value.into());
    }

    fn add_multimap(&mut self, other: Multimap) {
        for (key, values) in other.into_iter() {
            self.insert_many(key, values);
        }
    }

    fn get_all_ignore_case(&self, key: &str) -> Vec<&str> {
        // Keys differing only in case are visited in sorted order so the
        // result does not depend on hash order.
        let mut keys: Vec<&String> = self.keys().filter(|k| k.eq_ignore_ascii_case(key)).collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| self.get_vec(k.as_str()))
            .flat_map(|vs| vs.iter().map(String::as_str))
            .collect()
    }

    fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    fn remove_ignore_case(&mut self, key: &str) {
        self.retain(|k, _| !k.eq_ignore_ascii_case(key));
    }

    fn to_query_string(&self) -> String {
        let mut query = String::new();
        for (key, values) in self.iter_all() {
            for value in values {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&url_encode(key));
                query.push('=');
                query.push_str(&url_encode(value));
            }
        }
        query
    }

    fn get_canonical_query_string(&self) -> String {
        let mut pairs: Vec<(Cow<'_, str>, Cow<'_, str>)> = self
            .iter_all()
            .flat_map(|(key, values)| values.iter().map(move |v| (url_encode(key), url_encode(v))))
            .collect();
        pairs.sort();

        let mut query = String::with_capacity(
            pairs.iter().map(|(k, v)| k.len() + v.len() + 2).sum::<usize>(),
        );
        for (key, value) in pairs {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&key);
            query.push('=');
            query.push_str(&value);
        }
        query
    }
}
