use super::*;
use crate::cache::SyncCache;
use crate::message::Payload;
use serde_json::json;

#[test]
fn creation_then_update_collapses_into_the_creator_definition() {
    let mut cache = SyncCache::default();
    let creator = Message::new(Payload::new(payload_type::CREATE_ASSET, json!({"definition": {"name": "clip"}})));
    let creator_id = creator.id;
    cache.record_asset_creator(&creator);

    cache.apply_asset_update(&Message::new(Payload::new(
        payload_type::ASSET_UPDATE,
        json!({"assetId": "asset-1", "asset": {"volume": 0.5}}),
    )));

    let reply = Message::reply_to(creator_id, Payload::new("create-asset-reply", json!({"id": "asset-1", "duration": 2.0})));
    cache.complete_asset_creation(creator_id, &reply);

    let creator = cache.asset_creators.get(&creator_id).expect("creator stays cached");
    assert_eq!(creator.message.payload.get("asset").unwrap()["volume"], 0.5);
    let asset = cache.assets.get("asset-1").expect("asset materialized");
    assert_eq!(asset.duration, Some(2.0));
    assert!(asset.update.is_none(), "update folded into the creator, not buffered on the asset");
}

#[test]
fn update_for_a_load_assets_creator_buffers_on_the_asset_itself() {
    let mut cache = SyncCache::default();
    let creator = Message::new(Payload::new(payload_type::LOAD_ASSETS, json!({"definitions": []})));
    let creator_id = creator.id;
    cache.record_asset_creator(&creator);

    cache.apply_asset_update(&Message::new(Payload::new(
        payload_type::ASSET_UPDATE,
        json!({"assetId": "asset-2", "asset": {"volume": 0.9}}),
    )));
    let reply = Message::reply_to(creator_id, Payload::new("load-assets-reply", json!({"id": "asset-2"})));
    cache.complete_asset_creation(creator_id, &reply);

    let asset = cache.assets.get("asset-2").expect("asset materialized");
    assert_eq!(asset.update.as_ref().unwrap().payload.get("asset").unwrap()["volume"], 0.9);
}

#[test]
fn unload_assets_drops_creator_and_asset_in_the_container() {
    let mut cache = SyncCache::default();
    let creator = Message::new(Payload::new(payload_type::LOAD_ASSETS, json!({"containerId": "c1"})));
    let creator_id = creator.id;
    cache.record_asset_creator(&creator);
    let reply = Message::reply_to(creator_id, Payload::new("load-assets-reply", json!({"id": "asset-3"})));
    cache.complete_asset_creation(creator_id, &reply);

    cache.unload_assets(&Message::new(Payload::new(payload_type::UNLOAD_ASSETS, json!({"containerId": "c1"}))));

    assert!(cache.asset_creators.get(&creator_id).is_none());
    assert!(cache.assets.get("asset-3").is_none());
}
