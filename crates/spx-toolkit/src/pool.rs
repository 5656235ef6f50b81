//! Body and frame data the reference routines read from.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BodyRecord {
    pub name: String,
    pub values: BTreeMap<String, Vec<f64>>,
}

/// Why a body value lookup produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMiss {
    UnknownBody,
    MissingItem,
}

/// Loaded body constants and frame names, keyed by integer code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelPool {
    bodies: BTreeMap<i64, BodyRecord>,
    frames: BTreeMap<i64, String>,
}

fn key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

impl KernelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small solar-system data set.
    ///
    /// Dia carries its constants under code 553; its provisional code 55076
    /// is known by name only.
    pub fn standard() -> Self {
        let mut pool = Self::new();
        pool.define_body(10, "SUN");
        pool.set_body_values(10, "RADII", vec![696000.0, 696000.0, 696000.0]);
        pool.set_body_values(10, "GM", vec![132712440041.93938]);
        pool.define_body(399, "EARTH");
        pool.set_body_values(399, "RADII", vec![6378.1366, 6378.1366, 6356.7519]);
        pool.set_body_values(399, "GM", vec![398600.435436]);
        pool.define_body(301, "MOON");
        pool.set_body_values(301, "RADII", vec![1737.4, 1737.4, 1737.4]);
        pool.define_body(599, "JUPITER");
        pool.set_body_values(599, "RADII", vec![71492.0, 71492.0, 66854.0]);
        pool.define_body(553, "DIA");
        pool.set_body_values(553, "RADII", vec![2.0, 2.0, 2.0]);
        pool.define_body(55076, "S/2000 J11");

        pool.define_frame(1, "J2000");
        pool.define_frame(17, "ECLIPJ2000");
        pool.define_frame(10013, "IAU_EARTH");
        pool.define_frame(10020, "IAU_MOON");
        pool
    }

    pub fn define_body(&mut self, code: i64, name: &str) {
        self.bodies
            .entry(code)
            .and_modify(|record| record.name = name.to_string())
            .or_insert_with(|| BodyRecord {
                name: name.to_string(),
                values: BTreeMap::new(),
            });
    }

    /// Stores a body constant; the body is created with an empty name if new.
    pub fn set_body_values(&mut self, code: i64, item: &str, values: Vec<f64>) {
        self.bodies
            .entry(code)
            .or_insert_with(|| BodyRecord {
                name: String::new(),
                values: BTreeMap::new(),
            })
            .values
            .insert(key(item), values);
    }

    pub fn remove_body(&mut self, code: i64) -> Option<BodyRecord> {
        self.bodies.remove(&code)
    }

    pub fn body_code(&self, name: &str) -> Option<i64> {
        let wanted = key(name);
        self.bodies
            .iter()
            .find(|(_, record)| !record.name.is_empty() && key(&record.name) == wanted)
            .map(|(code, _)| *code)
    }

    pub fn body_name(&self, code: i64) -> Option<&str> {
        self.bodies
            .get(&code)
            .map(|record| record.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn body_values(&self, code: i64, item: &str) -> Result<&[f64], PoolMiss> {
        let record = self.bodies.get(&code).ok_or(PoolMiss::UnknownBody)?;
        record
            .values
            .get(&key(item))
            .map(Vec::as_slice)
            .ok_or(PoolMiss::MissingItem)
    }

    pub fn define_frame(&mut self, code: i64, name: &str) {
        self.frames.insert(code, name.to_string());
    }

    pub fn frame_code(&self, name: &str) -> Option<i64> {
        let wanted = key(name);
        self.frames
            .iter()
            .find(|(_, frame)| key(frame) == wanted)
            .map(|(code, _)| *code)
    }

    pub fn frame_name(&self, code: i64) -> Option<&str> {
        self.frames.get(&code).map(String::as_str)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (i64, &BodyRecord)> {
        self.bodies.iter().map(|(code, record)| (*code, record))
    }
}
