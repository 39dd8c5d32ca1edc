//! Resource vectors.
//!
//! A [`Resources`] value is a fixed-shape tuple of non-negative quantities,
//! one per [`Dimension`]. Every algorithm that touches resources iterates
//! over [`Dimension::ALL`], so a new dimension only needs a variant here.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A named resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    MemoryMb,
    DiskMb,
    Iops,
}

impl Dimension {
    /// Number of dimensions in a resource vector.
    pub const COUNT: usize = 4;

    /// All dimensions, in vector order.
    pub const ALL: [Dimension; Self::COUNT] = [
        Dimension::Cpu,
        Dimension::MemoryMb,
        Dimension::DiskMb,
        Dimension::Iops,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Cpu => "cpu",
            Dimension::MemoryMb => "memory_mb",
            Dimension::DiskMb => "disk_mb",
            Dimension::Iops => "iops",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capacity or usage across every [`Dimension`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ResourcesRepr", into = "ResourcesRepr")]
pub struct Resources {
    values: [u64; Dimension::COUNT],
}

impl Resources {
    /// The all-zero vector.
    pub const ZERO: Resources = Resources {
        values: [0; Dimension::COUNT],
    };

    /// Build a vector with CPU and memory set and every other dimension zero.
    pub fn new(cpu: u64, memory_mb: u64) -> Self {
        Self::ZERO
            .with(Dimension::Cpu, cpu)
            .with(Dimension::MemoryMb, memory_mb)
    }

    /// Return a copy with `dim` set to `value`.
    pub fn with(mut self, dim: Dimension, value: u64) -> Self {
        self.set(dim, value);
        self
    }

    pub fn get(&self, dim: Dimension) -> u64 {
        self.values[dim.index()]
    }

    pub fn set(&mut self, dim: Dimension, value: u64) {
        self.values[dim.index()] = value;
    }

    pub fn cpu(&self) -> u64 {
        self.get(Dimension::Cpu)
    }

    pub fn memory_mb(&self) -> u64 {
        self.get(Dimension::MemoryMb)
    }

    /// Iterate `(dimension, quantity)` pairs in vector order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// Element-wise sum. Saturates instead of wrapping.
    pub fn add(&self, other: &Resources) -> Resources {
        let mut out = *self;
        for dim in Dimension::ALL {
            out.set(dim, self.get(dim).saturating_add(other.get(dim)));
        }
        out
    }

    /// Check whether `self` covers `other` in every dimension.
    ///
    /// On failure the first dimension where `other` exceeds `self` is
    /// returned alongside `false`.
    pub fn superset(&self, other: &Resources) -> (bool, Option<Dimension>) {
        for dim in Dimension::ALL {
            if other.get(dim) > self.get(dim) {
                return (false, Some(dim));
            }
        }
        (true, None)
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources::add(&self, &rhs)
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = Resources::add(self, &rhs);
    }
}

impl Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Resources {
        iter.fold(Resources::ZERO, |acc, r| acc + r)
    }
}

impl<'a> Sum<&'a Resources> for Resources {
    fn sum<I: Iterator<Item = &'a Resources>>(iter: I) -> Resources {
        iter.fold(Resources::ZERO, |acc, r| acc + *r)
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (dim, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{dim}={value}")?;
        }
        Ok(())
    }
}

/// On-the-wire shape: a map with one optional key per dimension.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ResourcesRepr {
    cpu: u64,
    memory_mb: u64,
    disk_mb: u64,
    iops: u64,
}

impl From<ResourcesRepr> for Resources {
    fn from(r: ResourcesRepr) -> Self {
        Resources::ZERO
            .with(Dimension::Cpu, r.cpu)
            .with(Dimension::MemoryMb, r.memory_mb)
            .with(Dimension::DiskMb, r.disk_mb)
            .with(Dimension::Iops, r.iops)
    }
}

impl From<Resources> for ResourcesRepr {
    fn from(r: Resources) -> Self {
        ResourcesRepr {
            cpu: r.get(Dimension::Cpu),
            memory_mb: r.get(Dimension::MemoryMb),
            disk_mb: r.get(Dimension::DiskMb),
            iops: r.get(Dimension::Iops),
        }
    }
}

/// How the bin-pack stage turns slack into a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    /// Prefer nodes left most fully utilized after placement.
    #[default]
    #[serde(rename = "binpack", alias = "bin_pack")]
    BinPack,
    /// Prefer nodes left with the most free capacity.
    Spread,
}

impl fmt::Display for PackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackingMode::BinPack => f.write_str("binpack"),
            PackingMode::Spread => f.write_str("spread"),
        }
    }
}
