//! Pure DTIAS ↔ canonical mapping. Deterministic; no I/O.

use o2bridge_core::{
    ext_put, prefixed_id, strip_prefixed_id, Extensions, Resource, ResourceClass, ResourceKind, ResourcePool,
    ResourceType,
};
use serde_json::{Map, Value};

use crate::native::{Location, NativePool, NativeServer, NativeServerType, ProvisionRequest};

pub const NS: &str = "dtias";
pub const TYPE_PREFIX: &str = "dtias-servertype";
pub const ASSET_PREFIX: &str = "urn:o2bridge:dtias:server:";

/// Storage-optimized when storage exceeds this multiple of memory.
pub const STORAGE_RATIO: f64 = 10.0;
/// Network-optimized above this many ports.
pub const NETWORK_PORTS: u32 = 8;

/// `"City, Datacenter"` from whichever of the two is set, else country, else site id.
pub fn location_string(loc: &Location) -> String {
    let parts: Vec<&str> = [loc.city.as_str(), loc.datacenter.as_str()].into_iter().filter(|s| !s.is_empty()).collect();
    if !parts.is_empty() { return parts.join(", "); }
    if !loc.country.is_empty() { return loc.country.clone(); }
    loc.site_id.clone()
}

/// `geo:<lat>,<lon>` with six decimals; empty when both coordinates are zero.
pub fn geo_id(loc: &Location) -> String {
    if loc.latitude == 0.0 && loc.longitude == 0.0 { return String::new(); }
    format!("geo:{:.6},{:.6}", loc.latitude, loc.longitude)
}

/// Strict comparisons; boundary cases stay compute. Storage is checked before network.
pub fn classify(memory_gb: f64, storage_gb: f64, network_ports: u32) -> ResourceClass {
    if storage_gb > STORAGE_RATIO * memory_gb {
        ResourceClass::Storage
    } else if network_ports > NETWORK_PORTS {
        ResourceClass::Network
    } else {
        ResourceClass::Compute
    }
}

pub fn type_id(native: &str) -> String { prefixed_id(TYPE_PREFIX, native) }

/// Native server type id from a canonical type id. Unprefixed input is passed through.
pub fn native_type_id(id: &str) -> &str { strip_prefixed_id(TYPE_PREFIX, id).unwrap_or(id) }

pub fn asset_id(native: &str) -> String { format!("{}{}", ASSET_PREFIX, native) }

fn put_extra(ext: &mut Extensions, extra: &Map<String, Value>) {
    for (k, v) in extra.iter() { ext_put(ext, NS, k, v.clone()); }
}

pub fn pool_to_canonical(p: &NativePool, o_cloud_id: &str) -> ResourcePool {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "poolId", p.id.as_str());
    ext_put(&mut ext, NS, "location", serde_json::to_value(&p.location).unwrap_or(Value::Null));
    if !p.location.site_id.is_empty() { ext_put(&mut ext, NS, "siteId", p.location.site_id.as_str()); }
    ext_put(&mut ext, NS, "status", p.status.clone());
    ext_put(&mut ext, NS, "serverCount", p.server_count);
    if !p.labels.is_empty() { ext_put(&mut ext, NS, "labels", Value::Object(p.labels.clone())); }
    put_extra(&mut ext, &p.extra);
    ResourcePool {
        resource_pool_id: p.id.clone(),
        name: p.name.clone(),
        description: p.description.clone().unwrap_or_default(),
        location: location_string(&p.location),
        o_cloud_id: o_cloud_id.to_string(),
        global_location_id: geo_id(&p.location),
        extensions: ext,
    }
}

/// Canonical pool into the DTIAS create/update body. Location facets come from the
/// `dtias.location` extension when present, otherwise the display string is used as the city.
pub fn pool_from_canonical(p: &ResourcePool) -> NativePool {
    let location = p
        .extensions
        .get("dtias.location")
        .and_then(|v| serde_json::from_value::<Location>(v.clone()).ok())
        .unwrap_or_else(|| Location { city: p.location.clone(), ..Default::default() });
    let labels = p.extensions.get("dtias.labels").and_then(|v| v.as_object()).cloned().unwrap_or_default();
    NativePool {
        id: p.resource_pool_id.clone(),
        name: p.name.clone(),
        description: Some(p.description.clone()).filter(|d| !d.is_empty()),
        location,
        labels,
        ..Default::default()
    }
}

fn server_description(s: &NativeServer) -> String {
    if let Some(d) = s.description.as_ref().filter(|d| !d.is_empty()) { return d.clone(); }
    let hw = [s.vendor.as_str(), s.model.as_str()].into_iter().filter(|x| !x.is_empty()).collect::<Vec<_>>().join(" ");
    match (hw.is_empty(), s.serial_number.is_empty()) {
        (false, false) => format!("{} ({})", hw, s.serial_number),
        (false, true) => hw,
        (true, _) => s.name.clone(),
    }
}

pub fn server_to_resource(s: &NativeServer) -> Resource {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "serverId", s.id.as_str());
    if !s.name.is_empty() { ext_put(&mut ext, NS, "name", s.name.as_str()); }
    if !s.server_type_id.is_empty() { ext_put(&mut ext, NS, "serverTypeId", s.server_type_id.as_str()); }
    if !s.serial_number.is_empty() { ext_put(&mut ext, NS, "serialNumber", s.serial_number.as_str()); }
    if !s.vendor.is_empty() { ext_put(&mut ext, NS, "vendor", s.vendor.as_str()); }
    if !s.model.is_empty() { ext_put(&mut ext, NS, "model", s.model.as_str()); }
    ext_put(&mut ext, NS, "powerState", s.power_state.clone());
    ext_put(&mut ext, NS, "healthState", s.health_state.clone());
    ext_put(&mut ext, NS, "provisioningState", s.provisioning_state.clone());
    ext_put(&mut ext, NS, "hardware", s.hardware.clone());
    if !s.labels.is_empty() { ext_put(&mut ext, NS, "labels", Value::Object(s.labels.clone())); }
    put_extra(&mut ext, &s.extra);
    Resource {
        resource_id: s.id.clone(),
        resource_type_id: if s.server_type_id.is_empty() { String::new() } else { type_id(&s.server_type_id) },
        resource_pool_id: s.resource_pool_id.clone(),
        global_asset_id: asset_id(&s.id),
        description: server_description(s),
        extensions: ext,
    }
}

/// Provision body for an existing (discovered) server.
pub fn provision_request(r: &Resource) -> ProvisionRequest {
    ProvisionRequest {
        resource_pool_id: r.resource_pool_id.clone(),
        server_type_id: native_type_id(&r.resource_type_id).to_string(),
        configuration: r.extensions.get("dtias.configuration").cloned(),
    }
}

pub fn server_type_to_canonical(t: &NativeServerType) -> ResourceType {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "serverTypeId", t.id.as_str());
    ext_put(&mut ext, NS, "memoryGB", t.memory_gb);
    ext_put(&mut ext, NS, "storageGB", t.storage_gb);
    ext_put(&mut ext, NS, "networkPorts", t.network_ports);
    ext_put(&mut ext, NS, "cpu", t.cpu.clone());
    put_extra(&mut ext, &t.extra);
    ResourceType {
        resource_type_id: type_id(&t.id),
        name: if t.name.is_empty() { t.id.clone() } else { t.name.clone() },
        vendor: t.vendor.clone(),
        model: t.model.clone(),
        version: t.version.clone(),
        resource_class: classify(t.memory_gb, t.storage_gb, t.network_ports),
        resource_kind: ResourceKind::Physical,
        extensions: ext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loc(city: &str, dc: &str) -> Location {
        Location { city: city.into(), datacenter: dc.into(), ..Default::default() }
    }

    #[test]
    fn location_joins_city_and_datacenter() {
        let mut l = loc("Dallas", "dc-test-1");
        l.latitude = 32.7767;
        l.longitude = -96.797;
        assert_eq!(location_string(&l), "Dallas, dc-test-1");
        assert_eq!(geo_id(&l), "geo:32.776700,-96.797000");
    }

    #[test]
    fn location_fallbacks() {
        assert_eq!(location_string(&loc("", "dc-2")), "dc-2");
        let l = Location { country: "US".into(), site_id: "s-9".into(), ..Default::default() };
        assert_eq!(location_string(&l), "US");
        let l = Location { site_id: "s-9".into(), ..Default::default() };
        assert_eq!(location_string(&l), "s-9");
        assert_eq!(location_string(&Location::default()), "");
        assert_eq!(geo_id(&Location::default()), "");
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(64.0, 641.0, 2), ResourceClass::Storage);
        assert_eq!(classify(64.0, 640.0, 2), ResourceClass::Compute);
        assert_eq!(classify(64.0, 100.0, 9), ResourceClass::Network);
        assert_eq!(classify(64.0, 100.0, 8), ResourceClass::Compute);
        // storage wins over network
        assert_eq!(classify(8.0, 1000.0, 16), ResourceClass::Storage);
        assert_eq!(classify(0.0, 0.0, 0), ResourceClass::Compute);
    }

    #[test]
    fn type_ids_invert() {
        let t = NativeServerType { id: "r640".into(), memory_gb: 256.0, storage_gb: 960.0, network_ports: 4, ..Default::default() };
        let c = server_type_to_canonical(&t);
        assert_eq!(c.resource_type_id, "dtias-servertype-r640");
        assert_eq!(native_type_id(&c.resource_type_id), "r640");
        assert_eq!(c.extensions.get("dtias.serverTypeId"), Some(&json!("r640")));
        assert_eq!(c.name, "r640");
        assert_eq!(c.resource_class, ResourceClass::Compute);
    }

    #[test]
    fn server_translation_is_deterministic_and_lossless() {
        let s: NativeServer = serde_json::from_value(json!({
            "id": "srv-1",
            "serverTypeId": "r640",
            "resourcePoolId": "pool-a",
            "serialNumber": "SN123",
            "vendor": "Dell",
            "model": "R640",
            "powerState": "On",
            "hardware": {"cpu": {"cores": 32}, "disks": [{"sizeGB": 960}]},
            "rackPosition": "U12"
        }))
        .expect("decode");
        let a = server_to_resource(&s);
        let b = server_to_resource(&s);
        assert_eq!(a, b);
        assert_eq!(a.global_asset_id, "urn:o2bridge:dtias:server:srv-1");
        assert_eq!(a.resource_type_id, "dtias-servertype-r640");
        assert_eq!(a.description, "Dell R640 (SN123)");
        assert_eq!(a.extensions.get("dtias.hardware").and_then(|h| h.pointer("/cpu/cores")), Some(&json!(32)));
        assert_eq!(a.extensions.get("dtias.rackPosition"), Some(&json!("U12")));
        assert!(!a.extensions.contains_key("dtias.healthState"));
    }

    #[test]
    fn pool_without_description_or_coordinates() {
        let p: NativePool = serde_json::from_value(json!({"id": "p1", "name": "edge", "location": {"city": "Austin"}})).expect("decode");
        let c = pool_to_canonical(&p, "oc-1");
        assert_eq!(c.description, "");
        assert_eq!(c.global_location_id, "");
        assert_eq!(c.location, "Austin");
        assert_eq!(c.o_cloud_id, "oc-1");
        let back = pool_from_canonical(&c);
        assert_eq!(back.location.city, "Austin");
        assert_eq!(back.description, None);
    }
}
