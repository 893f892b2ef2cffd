//! Process a first-login mapping against an empty in-memory store.
//!
//! Usage: cargo run -p entwine-reconcile --example first_login

use std::sync::Arc;

use entwine_core::Provenance;
use entwine_reconcile::{
    GroupEffectMode, MappedAttribute, MappedGroup, MappedIdentity, MappingResult,
    ReconciliationEngine,
};
use entwine_store::model::{Attribute, CredentialRequirement, Identity};
use entwine_store::{AttributeStore, GroupStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let store = Arc::new(MemoryStore::new());
    let engine =
        ReconciliationEngine::new(store.clone(), store.clone(), store.clone(), store.clone());

    let source = Provenance::new("saml-corp", "corp-profile");
    let mut result = MappingResult::new()
        .with_identity(MappedIdentity::new(
            Identity::federated("email", "a@x.org", source.clone()),
            CredentialRequirement::new("password"),
        ))
        .with_attribute(MappedAttribute::new(
            Attribute::new("givenName", "/".parse()?, vec!["Ann".into()]),
            Some(source.clone()),
        ))
        .with_group(
            MappedGroup::new("/staff".parse()?, Some(source))
                .with_mode(GroupEffectMode::CreateGroupIfMissing),
        );

    engine.process(&mut result).await?;

    let entity = result
        .mapped_at_existing_entity
        .expect("mapping carried an identity, so an entity was created");
    println!("entity: {entity}");
    for membership in store.memberships_of(entity).await? {
        println!("member of {}", membership.group);
    }
    for stored in store.attributes_of(entity).await? {
        println!(
            "attribute {} @ {} = {:?}",
            stored.attribute.name, stored.attribute.group, stored.attribute.values
        );
    }
    Ok(())
}
