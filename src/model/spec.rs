use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REVISION: &str = "main";

/// One model to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub identifier: String,
    #[serde(rename = "destination")]
    pub destination_path: PathBuf,
    #[serde(default = "default_revision")]
    pub revision: String,
}

fn default_revision() -> String {
    DEFAULT_REVISION.to_string()
}

impl ArtifactSpec {
    pub fn new(identifier: impl Into<String>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            destination_path: destination_path.into(),
            revision: default_revision(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Parses `IDENTIFIER[@REVISION]=DESTINATION`.
    pub fn parse(arg: &str) -> Result<Self> {
        let (model, destination) = arg.split_once('=').ok_or_else(|| {
            Error::InvalidInput(format!(
                "Expected IDENTIFIER=DESTINATION, got '{}'",
                arg
            ))
        })?;

        let spec = match model.split_once('@') {
            Some((identifier, revision)) => {
                ArtifactSpec::new(identifier.trim(), destination.trim()).with_revision(revision.trim())
            }
            None => ArtifactSpec::new(model.trim(), destination.trim()),
        };

        spec.validate()?;
        Ok(spec)
    }

    /// Anchors a relative destination at `base`, so that two spellings of
    /// one directory compare equal.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.destination_path.is_relative() {
            self.destination_path = base.join(&self.destination_path);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(Error::InvalidInput("Model identifier is empty".to_string()));
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Destination for '{}' is empty",
                self.identifier
            )));
        }
        if self.revision.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Revision for '{}' is empty",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// Rejects a batch where two specs would write into the same directory.
pub fn ensure_unique_destinations(specs: &[ArtifactSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.destination_path.as_path()) {
            return Err(Error::InvalidInput(format!(
                "Destination {:?} is used by more than one artifact",
                spec.destination_path
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        let mut manifest: Manifest = toml::from_str(&content)?;

        if manifest.artifacts.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Manifest {:?} lists no artifacts",
                path
            )));
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.artifacts = manifest
            .artifacts
            .into_iter()
            .map(|spec| spec.validate().map(|_| spec.resolved_against(base)))
            .collect::<Result<_>>()?;

        ensure_unique_destinations(&manifest.artifacts)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair() {
        let spec = ArtifactSpec::parse("Huaibo/t5_dialog_jp=/tmp/cache/t5_dialog_jp").unwrap();
        assert_eq!(spec.identifier, "Huaibo/t5_dialog_jp");
        assert_eq!(spec.destination_path, PathBuf::from("/tmp/cache/t5_dialog_jp"));
        assert_eq!(spec.revision, "main");
    }

    #[test]
    fn parse_with_revision() {
        let spec = ArtifactSpec::parse("sonoisa/t5-base-japanese@v1.0=/tmp/cache/t5_jp").unwrap();
        assert_eq!(spec.identifier, "sonoisa/t5-base-japanese");
        assert_eq!(spec.revision, "v1.0");
    }

    #[test]
    fn parse_rejects_missing_or_empty_parts() {
        assert!(matches!(
            ArtifactSpec::parse("sonoisa/t5-base-japanese"),
            Err(Error::InvalidInput(_))
        ));
        assert!(ArtifactSpec::parse("=/tmp/cache").is_err());
        assert!(ArtifactSpec::parse("sonoisa/t5-base-japanese=").is_err());
        assert!(ArtifactSpec::parse("sonoisa/t5-base-japanese@=/tmp/x").is_err());
    }

    #[test]
    fn duplicate_destinations_rejected() {
        let specs = vec![
            ArtifactSpec::new("a/one", "/tmp/same"),
            ArtifactSpec::new("b/two", "/tmp/same"),
        ];
        assert!(ensure_unique_destinations(&specs).is_err());

        let specs = vec![
            ArtifactSpec::new("a/one", "/tmp/one"),
            ArtifactSpec::new("b/two", "/tmp/two"),
        ];
        assert!(ensure_unique_destinations(&specs).is_ok());
    }

    #[test]
    fn relative_and_absolute_spellings_collide_once_resolved() {
        let cwd = Path::new("/work");
        let specs = vec![
            ArtifactSpec::parse("Huaibo/t5_dialog_jp=t5_jp").unwrap().resolved_against(cwd),
            ArtifactSpec::parse("sonoisa/t5-base-japanese=/work/./t5_jp")
                .unwrap()
                .resolved_against(cwd),
        ];
        assert_eq!(specs[0].destination_path, PathBuf::from("/work/t5_jp"));
        assert!(matches!(
            ensure_unique_destinations(&specs),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn manifest_resolves_relative_destinations() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("models.toml");
        fs::write(
            &path,
            r#"
[[artifact]]
identifier = "Huaibo/t5_dialog_jp"
destination = "t5_dialog_jp"

[[artifact]]
identifier = "sonoisa/t5-base-japanese"
destination = "/tmp/cache/t5_jp"
revision = "refs/pr/1"
"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.artifacts.len(), 2);
        assert_eq!(manifest.artifacts[0].destination_path, tmp.path().join("t5_dialog_jp"));
        assert_eq!(manifest.artifacts[0].revision, "main");
        assert_eq!(manifest.artifacts[1].destination_path, PathBuf::from("/tmp/cache/t5_jp"));
        assert_eq!(manifest.artifacts[1].revision, "refs/pr/1");
    }

    #[test]
    fn shipped_manifest_lists_both_t5_models() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("manifests/t5_japanese.toml");
        let manifest = Manifest::load(&path).unwrap();
        let identifiers: Vec<_> = manifest.artifacts.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["Huaibo/t5_dialog_jp", "sonoisa/t5-base-japanese"]);
    }

    #[test]
    fn empty_manifest_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.toml");
        fs::write(&path, "").unwrap();
        assert!(matches!(Manifest::load(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn missing_manifest_is_filesystem_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Manifest::load(&tmp.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Filesystem);
    }
}
