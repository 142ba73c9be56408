//! Nova ↔ canonical mapping.

use o2bridge_core::{
    ext_put, prefixed_id, strip_prefixed_id, Extensions, O2Error, O2Result, Resource, ResourceClass, ResourceKind,
    ResourcePool, ResourceType,
};
use serde_json::{json, Map, Value};

use crate::native::{AvailabilityZone, NativeFlavor, NativeServer, ServerCreate};

pub const NS: &str = "openstack";
pub const POOL_PREFIX: &str = "openstack-az";
pub const TYPE_PREFIX: &str = "openstack-flavor";
pub const ASSET_PREFIX: &str = "urn:o2bridge:openstack:server:";

/// Storage-optimized when root disk (GiB) exceeds this multiple of RAM (GiB).
pub const STORAGE_RATIO: f64 = 10.0;

pub fn pool_id(zone: &str) -> String { prefixed_id(POOL_PREFIX, zone) }
pub fn type_id(flavor: &str) -> String { prefixed_id(TYPE_PREFIX, flavor) }

pub fn zone_of(pool_id: &str) -> &str { strip_prefixed_id(POOL_PREFIX, pool_id).unwrap_or(pool_id) }
pub fn flavor_of(type_id: &str) -> &str { strip_prefixed_id(TYPE_PREFIX, type_id).unwrap_or(type_id) }

pub fn classify(ram_mib: u64, disk_gib: u64) -> ResourceClass {
    let ram_gib = ram_mib as f64 / 1024.0;
    if disk_gib as f64 > STORAGE_RATIO * ram_gib { ResourceClass::Storage } else { ResourceClass::Compute }
}

pub fn zone_to_pool(z: &AvailabilityZone, region: &str, o_cloud_id: &str) -> ResourcePool {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "zoneName", z.zone_name.as_str());
    ext_put(&mut ext, NS, "available", z.zone_state.available);
    ext_put(&mut ext, NS, "hosts", z.hosts.clone());
    if !region.is_empty() { ext_put(&mut ext, NS, "region", region); }
    let location = if region.is_empty() { z.zone_name.clone() } else { format!("{}, {}", region, z.zone_name) };
    ResourcePool {
        resource_pool_id: pool_id(&z.zone_name),
        name: z.zone_name.clone(),
        description: String::new(),
        location,
        o_cloud_id: o_cloud_id.to_string(),
        global_location_id: String::new(),
        extensions: ext,
    }
}

pub fn server_to_resource(s: &NativeServer) -> Resource {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "serverId", s.id.as_str());
    ext_put(&mut ext, NS, "name", s.name.as_str());
    ext_put(&mut ext, NS, "status", s.status.as_str());
    ext_put(&mut ext, NS, "flavor", serde_json::to_value(&s.flavor).unwrap_or(Value::Null));
    if !s.availability_zone.is_empty() { ext_put(&mut ext, NS, "availabilityZone", s.availability_zone.as_str()); }
    ext_put(&mut ext, NS, "addresses", s.addresses.clone());
    if !s.metadata.is_empty() { ext_put(&mut ext, NS, "metadata", Value::Object(s.metadata.clone())); }
    ext_put(&mut ext, NS, "created", s.created.clone());
    ext_put(&mut ext, NS, "updated", s.updated.clone());
    ext_put(&mut ext, NS, "tenantId", s.tenant_id.clone());
    ext_put(&mut ext, NS, "hostId", s.host_id.clone());
    for (k, v) in s.extra.iter() { ext_put(&mut ext, NS, k, v.clone()); }
    Resource {
        resource_id: s.id.clone(),
        resource_type_id: if s.flavor.id.is_empty() { String::new() } else { type_id(&s.flavor.id) },
        resource_pool_id: if s.availability_zone.is_empty() { String::new() } else { pool_id(&s.availability_zone) },
        global_asset_id: format!("{}{}", ASSET_PREFIX, s.id),
        description: s.name.clone(),
        extensions: ext,
    }
}

/// Canonical resource into a boot request. Name comes from `openstack.name` (falling back to the
/// description), image from `openstack.imageRef`, networks from `openstack.networks` (default `"auto"`).
pub fn server_create(r: &Resource) -> O2Result<ServerCreate> {
    let s = |k: &str| r.extensions.get(&format!("{}.{}", NS, k)).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let name = Some(s("name")).filter(|n| !n.is_empty()).unwrap_or_else(|| r.description.clone());
    if name.trim().is_empty() {
        return Err(O2Error::InvalidArgument("server name is required (openstack.name or description)".into()));
    }
    if r.resource_type_id.is_empty() {
        return Err(O2Error::InvalidArgument("resourceTypeId (flavor) is required".into()));
    }
    let metadata: Map<String, Value> = r.extensions.get("openstack.metadata").and_then(|v| v.as_object()).cloned().unwrap_or_default();
    Ok(ServerCreate {
        name,
        flavor_ref: flavor_of(&r.resource_type_id).to_string(),
        image_ref: s("imageRef"),
        availability_zone: if r.resource_pool_id.is_empty() { String::new() } else { zone_of(&r.resource_pool_id).to_string() },
        networks: r.extensions.get("openstack.networks").cloned().unwrap_or_else(|| json!("auto")),
        metadata,
    })
}

pub fn flavor_to_type(f: &NativeFlavor) -> ResourceType {
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "flavorId", f.id.as_str());
    ext_put(&mut ext, NS, "ramMiB", f.ram);
    ext_put(&mut ext, NS, "vcpus", f.vcpus);
    ext_put(&mut ext, NS, "diskGiB", f.disk);
    ext_put(&mut ext, NS, "description", f.description.clone());
    ext_put(&mut ext, NS, "isPublic", f.is_public);
    for (k, v) in f.extra.iter() { ext_put(&mut ext, NS, k, v.clone()); }
    ResourceType {
        resource_type_id: type_id(&f.id),
        name: if f.name.is_empty() { f.id.clone() } else { f.name.clone() },
        vendor: "OpenStack".into(),
        model: format!("{} vCPU / {} MiB / {} GiB", f.vcpus, f.ram, f.disk),
        version: String::new(),
        resource_class: classify(f.ram, f.disk),
        resource_kind: ResourceKind::Logical,
        extensions: ext,
    }
}
