// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{SourcesFixture, StaticPolicy};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use repoman::{
    auth::Caller,
    config::Settings,
    service::ServiceError,
    store::SourceStore,
};
use std::fs::read_to_string;

const SYSTEM: &str = indoc! {r#"
    X-Repolib-Name: Pop_OS System Sources
    Enabled: yes
    Types: deb
    URIs: http://apt.pop-os.org/ubuntu
    Suites: jammy jammy-security jammy-updates
    Components: main restricted
"#};

#[tokio::test]
async fn toggle_system_components_and_pockets() -> Result<()> {
    let fixture = SourcesFixture::new()?.with_source("system", SYSTEM)?;
    let service = fixture.service(StaticPolicy::allow())?;
    let caller = Caller::new(":1.42");

    service.set_component_enabled(Some(&caller), "universe", true).await?;
    service.set_component_enabled(Some(&caller), "restricted", false).await?;
    service.set_child_enabled(Some(&caller), "-backports", true).await?;
    service.set_child_enabled(Some(&caller), "-security", false).await?;
    service.set_source_code_enabled(Some(&caller), true).await?;

    let expect = indoc! {r#"
        X-Repolib-Name: Pop_OS System Sources
        Enabled: yes
        Types: deb deb-src
        URIs: http://apt.pop-os.org/ubuntu
        Suites: jammy jammy-backports jammy-updates
        Components: main universe
    "#};
    assert_eq!(fixture.read("system")?, expect);
    assert_eq!(service.authorizer().policy().checks(), 5);

    Ok(())
}

#[tokio::test]
async fn denied_caller_is_logged_and_nothing_changes() -> Result<()> {
    let fixture = SourcesFixture::new()?.with_source("system", SYSTEM)?;
    let service = fixture.service(StaticPolicy::deny())?;
    let caller = Caller::new(":1.77");

    let result = service
        .add_repo(Some(&caller), "deb http://apt.example.com jammy main")
        .await;
    assert!(matches!(result, Err(ServiceError::Denied(_))));

    let result = service.add_component(Some(&caller), "system", "universe").await;
    assert!(matches!(result, Err(ServiceError::Denied(_))));

    assert_eq!(fixture.read("system")?, SYSTEM);
    assert!(!fixture.source_path("apt-example-com").exists());

    let log = read_to_string(fixture.denial_log())?;
    let lines = log.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" : "));
    assert!(lines[0].contains(":1.77"));
    assert!(lines[0].contains("31337"));
    assert!(lines[0].contains("ro.santopiet.repoman.addppa"));
    assert!(lines[1].contains("ro.santopiet.repoman.modppa"));

    Ok(())
}

#[tokio::test]
async fn legacy_lines_round_trip_through_deb822() -> Result<()> {
    let fixture = SourcesFixture::new()?.with_source("system", SYSTEM)?;
    let service = fixture.service(StaticPolicy::deny())?;

    service
        .add_repo(
            None,
            "deb [arch=amd64 signed-by=/usr/share/keyrings/example.gpg] https://apt.example.com/repo stable main",
        )
        .await?;

    let expect = indoc! {r#"
        X-Repolib-Name: apt-example-com-repo
        Enabled: yes
        Types: deb
        URIs: https://apt.example.com/repo
        Suites: stable
        Components: main
        Architectures: amd64
        Signed-By: /usr/share/keyrings/example.gpg
    "#};
    assert_eq!(fixture.read("apt-example-com-repo")?, expect);

    service
        .remove_repo(
            None,
            "deb [arch=amd64 signed-by=/usr/share/keyrings/example.gpg]   https://apt.example.com/repo stable main",
        )
        .await?;
    assert!(!fixture.source_path("apt-example-com-repo").exists());
    assert_eq!(service.authorizer().policy().checks(), 0);

    Ok(())
}

#[tokio::test]
async fn modify_through_legacy_alias_keeps_file() -> Result<()> {
    let fixture = SourcesFixture::new()?
        .with_source("system", SYSTEM)?
        .with_source(
            "vendor",
            indoc! {r#"
                X-Repolib-Name: Vendor
                Enabled: yes
                Types: deb
                URIs: https://apt.vendor.example
                Suites: stable
                Components: main
            "#},
        )?;
    let service = fixture.service(StaticPolicy::allow())?;

    service
        .modify_repo(
            None,
            "deb https://apt.vendor.example stable main",
            "# deb https://apt.vendor.example testing main non-free",
        )
        .await?;

    let expect = indoc! {r#"
        X-Repolib-Name: Vendor
        Enabled: no
        Types: deb
        URIs: https://apt.vendor.example
        Suites: testing
        Components: main non-free
    "#};
    assert_eq!(fixture.read("vendor")?, expect);

    Ok(())
}

#[test]
fn settings_point_store_at_sources() -> Result<()> {
    let fixture = SourcesFixture::new()?.with_source("system", SYSTEM)?;
    let config = fixture.root().join("repoman.toml");
    std::fs::write(
        &config,
        format!(
            "[sources]\ndir = {:?}\nsystem = \"system\"\n\n[service]\nbus = \"session\"\n",
            fixture.sources_dir()
        ),
    )?;

    let settings = Settings::load(&config)?;
    let store = SourceStore::open(&settings.sources.dir, &settings.sources.system)?;

    assert_eq!(settings.system_source_path(), fixture.source_path("system"));
    assert_eq!(
        store.system_source()?.suites().collect::<Vec<_>>(),
        vec!["jammy", "jammy-security", "jammy-updates"]
    );

    Ok(())
}
