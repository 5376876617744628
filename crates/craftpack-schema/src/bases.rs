use crate::project::BaseConfig;
use crate::SchemaError;

/// Check that every requested index is non-negative and names a configured base.
pub fn validate_bases_indices(indices: &[i64], configured: usize) -> Result<(), SchemaError> {
    for &idx in indices {
        let fits = usize::try_from(idx).is_ok_and(|i| i < configured);
        if !fits {
            return Err(SchemaError::InvalidBasesIndex(idx));
        }
    }
    Ok(())
}

/// Resolve the bases to build for. No indices means every configured base.
///
/// Duplicates are dropped; the remaining order follows the request.
pub fn select_bases<'a>(
    bases: &'a [BaseConfig],
    indices: &[i64],
) -> Result<Vec<(usize, &'a BaseConfig)>, SchemaError> {
    validate_bases_indices(indices, bases.len())?;
    if indices.is_empty() {
        return Ok(bases.iter().enumerate().collect());
    }

    let mut selected: Vec<(usize, &BaseConfig)> = Vec::with_capacity(indices.len());
    for &idx in indices {
        let idx = idx as usize;
        if !selected.iter().any(|(i, _)| *i == idx) {
            selected.push((idx, &bases[idx]));
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bases() -> Vec<BaseConfig> {
        vec![
            BaseConfig {
                name: "ubuntu".to_owned(),
                channel: "22.04".to_owned(),
                architectures: vec!["amd64".to_owned()],
            },
            BaseConfig {
                name: "ubuntu".to_owned(),
                channel: "24.04".to_owned(),
                architectures: Vec::new(),
            },
        ]
    }

    #[test]
    fn valid_indices_pass() {
        for indices in [&[][..], &[0], &[1], &[1, 0]] {
            assert!(validate_bases_indices(indices, 2).is_ok(), "{indices:?}");
        }
    }

    #[test]
    fn invalid_indices_name_the_first_bad_one() {
        let cases: [(&[i64], i64); 4] = [(&[-1], -1), (&[0, -1], -1), (&[1, 0, -1], -1), (&[3, 1], 3)];
        for (indices, bad) in cases {
            let err = validate_bases_indices(indices, 2).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!(
                    "Bases index '{bad}' is invalid (must be >= 0 and fit in configured bases)."
                )
            );
        }
    }

    #[test]
    fn select_defaults_to_all_bases() {
        let bases = two_bases();
        let selected = select_bases(&bases, &[]).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[1].0, 1);
    }

    #[test]
    fn select_follows_request_order_without_duplicates() {
        let bases = two_bases();
        let selected = select_bases(&bases, &[1, 0, 1]).unwrap();
        let idx: Vec<usize> = selected.iter().map(|(i, _)| *i).collect();
        assert_eq!(idx, [1, 0]);
    }

    #[test]
    fn select_rejects_out_of_range() {
        let bases = two_bases();
        assert!(select_bases(&bases, &[2]).is_err());
    }
}
