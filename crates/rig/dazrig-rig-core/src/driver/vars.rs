//! Single-letter driver variable allocation.

use hashbrown::HashSet;

const BONE_AXES: [&str; 3] = ["A", "B", "C"];
const POOL: &str = "DEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Hands out variable names for one driver. `A`, `B`, `C` belong to the first
/// driving bone; everything else draws from `D..Z, a..z`. Names already on the
/// host driver are never reused.
#[derive(Debug, Clone, Default)]
pub struct VariablePool {
    taken: HashSet<String>,
    first_bone_claimed: bool,
}

impl VariablePool {
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taken: existing.into_iter().map(Into::into).collect(),
            first_bone_claimed: false,
        }
    }

    /// Three names for a driving bone's x/y/z channels.
    pub fn bone_axes(&mut self) -> Option<[String; 3]> {
        if !self.first_bone_claimed {
            self.first_bone_claimed = true;
            if BONE_AXES.iter().all(|n| !self.taken.contains(*n)) {
                let names = BONE_AXES.map(str::to_string);
                self.taken.extend(names.iter().cloned());
                return Some(names);
            }
        }
        if self.remaining() < 3 {
            return None;
        }
        let a = self.next()?;
        let b = self.next()?;
        let c = self.next()?;
        Some([a, b, c])
    }

    pub fn next(&mut self) -> Option<String> {
        let name = POOL
            .chars()
            .map(String::from)
            .find(|n| !self.taken.contains(n))?;
        self.taken.insert(name.clone());
        Some(name)
    }

    pub fn remaining(&self) -> usize {
        POOL.chars()
            .filter(|c| !self.taken.contains(c.to_string().as_str()))
            .count()
    }
}
