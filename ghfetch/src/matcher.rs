use regex::Regex;

use crate::error::{FetchError, Result};
use crate::github::Asset;

/// An asset selected by one of the user's patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedAsset {
    /// Position of the pattern on the command line. Overrides and chmod
    /// values are looked up by this index, so a skipped pattern leaves a gap
    /// instead of shifting later assets onto the wrong values.
    pub pattern_index: usize,
    pub pattern: String,
    pub asset: Asset,
}

/// Compile every pattern up front so a typo fails before any download.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| FetchError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Select one asset per pattern, in pattern order.
///
/// Each pattern takes the first asset, in release order, whose name contains
/// a match. A pattern that matches nothing is an error unless
/// `allow_missing` is set, in which case it is logged and left out of the
/// result.
pub fn match_assets(
    assets: &[Asset],
    patterns: &[String],
    allow_missing: bool,
    repo: &str,
) -> Result<Vec<MatchedAsset>> {
    let regexes = compile_patterns(patterns)?;
    let mut matched = Vec::with_capacity(patterns.len());

    for (pattern_index, (pattern, regex)) in patterns.iter().zip(&regexes).enumerate() {
        match assets.iter().find(|asset| regex.is_match(&asset.name)) {
            Some(asset) => {
                tracing::debug!("Pattern /{}/ matched {}", pattern, asset.name);
                matched.push(MatchedAsset {
                    pattern_index,
                    pattern: pattern.clone(),
                    asset: asset.clone(),
                });
            }
            None if allow_missing => {
                tracing::warn!("No asset matching /{}/ in {}; skipping", pattern, repo);
            }
            None => {
                let available = assets
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(FetchError::NotFound {
                    pattern: pattern.clone(),
                    repo: repo.to_string(),
                    available: if available.is_empty() {
                        "No assets available".to_string()
                    } else {
                        available
                    },
                });
            }
        }
    }

    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            download_url: format!("https://example.com/{name}"),
        }
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    fn release_assets() -> Vec<Asset> {
        vec![
            asset("chainsaw_all_platforms+rules.zip"),
            asset("chainsaw_x86_64-unknown-linux-gnu.tar.gz"),
            asset("chainsaw_x86_64-unknown-linux-musl.tar.gz"),
            asset("linpeas.sh"),
            asset("winPEASx64.exe"),
        ]
    }

    #[test]
    fn test_substring_search_semantics() {
        let matched =
            match_assets(&release_assets(), &patterns(&["linpeas"]), false, "o/r").unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].asset.name, "linpeas.sh");
    }

    #[test]
    fn test_first_match_in_release_order_wins() {
        let matched = match_assets(
            &release_assets(),
            &patterns(&[r"linux.*\.tar\.gz"]),
            false,
            "o/r",
        )
        .unwrap();
        assert_eq!(
            matched[0].asset.name,
            "chainsaw_x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let result = match_assets(&release_assets(), &patterns(&["LINPEAS"]), false, "o/r");
        assert!(matches!(result, Err(FetchError::NotFound { .. })));

        let matched =
            match_assets(&release_assets(), &patterns(&["(?i)LINPEAS"]), false, "o/r").unwrap();
        assert_eq!(matched[0].asset.name, "linpeas.sh");
    }

    #[test]
    fn test_output_follows_pattern_order() {
        let matched = match_assets(
            &release_assets(),
            &patterns(&["winPEAS", "linpeas", "musl"]),
            false,
            "o/r",
        )
        .unwrap();
        let names: Vec<_> = matched.iter().map(|m| m.asset.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "winPEASx64.exe",
                "linpeas.sh",
                "chainsaw_x86_64-unknown-linux-musl.tar.gz"
            ]
        );
        let indices: Vec<_> = matched.iter().map(|m| m.pattern_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_unmatched_pattern_fails_without_allow_missing() {
        let err = match_assets(
            &release_assets(),
            &patterns(&["linpeas", "does-not-exist"]),
            false,
            "carlospolop/PEASS-ng",
        )
        .unwrap_err();

        match err {
            FetchError::NotFound {
                pattern,
                repo,
                available,
            } => {
                assert_eq!(pattern, "does-not-exist");
                assert_eq!(repo, "carlospolop/PEASS-ng");
                assert!(available.contains("linpeas.sh"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_allow_missing_skips_and_keeps_pattern_index() {
        let matched = match_assets(
            &release_assets(),
            &patterns(&["does-not-exist", "linpeas", "winPEAS"]),
            true,
            "o/r",
        )
        .unwrap();

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].asset.name, "linpeas.sh");
        assert_eq!(matched[0].pattern_index, 1);
        assert_eq!(matched[1].asset.name, "winPEASx64.exe");
        assert_eq!(matched[1].pattern_index, 2);
    }

    #[test]
    fn test_no_assets_reports_empty_release() {
        let err = match_assets(&[], &patterns(&["anything"]), false, "o/r").unwrap_err();
        assert!(err.to_string().contains("No assets available"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let result = match_assets(&release_assets(), &patterns(&["linpeas", "("]), true, "o/r");
        assert!(matches!(
            result,
            Err(FetchError::InvalidPattern { ref pattern, .. }) if pattern == "("
        ));
    }

    #[test]
    fn test_same_asset_can_satisfy_two_patterns() {
        let matched = match_assets(
            &release_assets(),
            &patterns(&["linpeas", r"\.sh$"]),
            false,
            "o/r",
        )
        .unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].asset, matched[1].asset);
    }
}
