//! C3 linearization of a space's bases.

use modelspace_common::{ModelError, ModelResult};

/// Merge the linearizations of `direct_bases` (each obtained through
/// `mro_of`, which must return the base itself first) together with the
/// direct-base list.
///
/// The result does not include the space being constructed; callers prefix
/// it. Fails with `Inheritance` when no consistent order exists.
pub fn linearize<T, F>(direct_bases: &[T], mut mro_of: F) -> ModelResult<Vec<T>>
where
    T: Copy + PartialEq + std::fmt::Debug,
    F: FnMut(T) -> ModelResult<Vec<T>>,
{
    for (i, base) in direct_bases.iter().enumerate() {
        if direct_bases[..i].contains(base) {
            return Err(ModelError::Inheritance(format!("duplicate base {base:?}")));
        }
    }

    let mut seqs: Vec<Vec<T>> = Vec::with_capacity(direct_bases.len() + 1);
    for &base in direct_bases {
        seqs.push(mro_of(base)?);
    }
    seqs.push(direct_bases.to_vec());

    let mut result = Vec::new();
    loop {
        seqs.retain(|s| !s.is_empty());
        if seqs.is_empty() {
            return Ok(result);
        }

        // First head that does not appear in the tail of any sequence
        let candidate = seqs
            .iter()
            .map(|s| s[0])
            .find(|head| seqs.iter().all(|s| !s[1..].contains(head)));

        let Some(next) = candidate else {
            return Err(ModelError::Inheritance(
                "cannot create a consistent method resolution order".to_string(),
            ));
        };

        result.push(next);
        for seq in seqs.iter_mut() {
            if seq.first() == Some(&next) {
                seq.remove(0);
            }
        }
    }
}
