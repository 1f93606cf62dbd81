//! Integration tests for loading package descriptors from disk and network.

use anyhow::Result;
use dpv_schema::{DescriptorError, FieldType, Locator, PackageLoader, SchemaRegistry};
use std::path::PathBuf;
use std::time::Duration;

fn packages_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../testdata/packages")
}

#[tokio::test]
async fn test_load_hsds_package() -> Result<()> {
    let path = packages_dir().join("hsds/datapackage.json");
    let descriptor = PackageLoader::new().load(&path.to_string_lossy()).await?;

    assert_eq!(descriptor.name(), Some("hsds"));
    assert_eq!(descriptor.resource_names(), vec!["organization", "service"]);

    let service = descriptor.resource("service").unwrap();
    assert_eq!(
        service.location(),
        &Locator::Local(packages_dir().join("hsds/services.csv"))
    );
    assert_eq!(
        service.schema().field("capacity").unwrap().field_type,
        FieldType::Integer
    );
    assert_eq!(descriptor.foreign_keys_from("service").count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_load_yaml_package() -> Result<()> {
    let path = packages_dir().join("hsds-yaml/datapackage.yaml");
    let descriptor = PackageLoader::new().load(&path.to_string_lossy()).await?;

    assert_eq!(descriptor.resource_names(), vec!["organization", "service"]);
    let registry = SchemaRegistry::from_descriptor(&descriptor);
    assert!(registry.contains("organization"));
    assert_eq!(registry.get("service").unwrap().primary_key(), &["id".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let path = packages_dir().join("does-not-exist/datapackage.json");
    let err = PackageLoader::new()
        .load(&path.to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, DescriptorError::Io { .. }));
    assert!(err.is_fetch());
}

#[tokio::test]
async fn test_load_from_temp_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("datapackage.json");
    std::fs::write(
        &path,
        r#"{"resources": [{"name": "taxonomy", "path": "data/taxonomy.csv",
            "schema": {"fields": [{"name": "id", "type": "integer"}], "primaryKey": "id"}}]}"#,
    )?;

    let descriptor = PackageLoader::new().load(&path.to_string_lossy()).await?;
    assert_eq!(
        descriptor.resource("taxonomy").unwrap().location(),
        &Locator::Local(dir.path().join("data/taxonomy.csv"))
    );
    Ok(())
}

#[tokio::test]
async fn test_remote_fetch_times_out() -> Result<()> {
    // Accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let _server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let loader = PackageLoader::new().fetch_timeout(Duration::from_millis(200));
    let err = loader
        .load(&format!("http://{addr}/datapackage.json"))
        .await
        .unwrap_err();

    assert!(matches!(err, DescriptorError::FetchTimeout { .. }));
    assert!(err.is_fetch());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_remote_is_fetch_error() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = PackageLoader::new()
        .load(&format!("http://{addr}/datapackage.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, DescriptorError::Fetch { .. }));
}
