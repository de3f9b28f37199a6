//! # Record Templates
//!
//! Each trial builds exactly one record template and re-serializes it for
//! every send. Only the header's sequence number and send timestamp change
//! between sends, so serialization cost stays realistic while the sender loop
//! never builds a fresh record.
//!
//! Small records model a single order event of a few hundred bytes. Large
//! records carry a customer, two addresses and a long list of line items,
//! landing in the low tens of kilobytes once encoded.
//!
//! Binary scenarios come in two record types: `Specific` uses the typed
//! structs below directly, `Generic` carries the same content as a list of
//! named fields resolved at runtime.

use crate::scenario::{Format, PayloadSize, RecordType, Scenario};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Version stamped into every header.
pub const SCHEMA_VERSION: u32 = 3;

const LARGE_LINE_ITEMS: usize = 120;
const TEMPLATE_SEED: u64 = 0x5EED_0F_0DE5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub sequence: u64,
    pub sent_at: String,
    pub source: String,
    pub schema_version: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmallOrder {
    pub header: MessageHeader,
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub currency: String,
    pub priority: bool,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub loyalty_points: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub discounted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeOrder {
    pub header: MessageHeader,
    pub order_id: String,
    pub customer: Customer,
    pub shipping: Address,
    pub billing: Address,
    pub items: Vec<LineItem>,
    pub notes: String,
}

/// A dynamically typed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    Array(Vec<FieldValue>),
    Record(GenericRecord),
}

/// A record addressed by field name rather than by struct member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub schema: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl GenericRecord {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            fields: Vec::new(),
        }
    }

    fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// One record template of any shape the suite sends.
#[derive(Clone, Debug, PartialEq)]
pub enum BenchRecord {
    Small(SmallOrder),
    Large(Box<LargeOrder>),
    Generic(GenericRecord),
}

impl BenchRecord {
    /// Current header sequence number.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            BenchRecord::Small(r) => Some(r.header.sequence),
            BenchRecord::Large(r) => Some(r.header.sequence),
            BenchRecord::Generic(r) => match generic_header(r)?.get("sequence")? {
                FieldValue::Long(v) => Some(*v as u64),
                _ => None,
            },
        }
    }

    /// Current header send timestamp.
    pub fn sent_at(&self) -> Option<&str> {
        match self {
            BenchRecord::Small(r) => Some(&r.header.sent_at),
            BenchRecord::Large(r) => Some(&r.header.sent_at),
            BenchRecord::Generic(r) => match generic_header(r)?.get("sentAt")? {
                FieldValue::Str(v) => Some(v),
                _ => None,
            },
        }
    }
}

fn generic_header(record: &GenericRecord) -> Option<&GenericRecord> {
    match record.get("header")? {
        FieldValue::Record(h) => Some(h),
        _ => None,
    }
}

/// Builds the template for one (format, size, record type) combination and
/// stamps headers before each send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataFactory {
    pub format: Format,
    pub size: PayloadSize,
    pub record_type: RecordType,
}

impl DataFactory {
    pub fn new(format: Format, size: PayloadSize, record_type: RecordType) -> Self {
        Self {
            format,
            size,
            record_type,
        }
    }

    pub fn for_scenario(scenario: &Scenario) -> Self {
        Self::new(scenario.format, scenario.size, scenario.record_type)
    }

    /// Build a fully populated template. Filler content comes from a fixed
    /// seed, so every trial serializes byte-identical bodies apart from the
    /// header.
    pub fn build_template(&self) -> BenchRecord {
        let mut rng = StdRng::seed_from_u64(TEMPLATE_SEED);
        let header = MessageHeader {
            sequence: 0,
            sent_at: String::with_capacity(32),
            source: "broker-bench".to_string(),
            schema_version: SCHEMA_VERSION,
        };

        let generic = self.format == Format::Binary && self.record_type == RecordType::Generic;
        match self.size {
            PayloadSize::Small => {
                let order = small_order(header, &mut rng);
                if generic {
                    BenchRecord::Generic(small_to_generic(&order))
                } else {
                    BenchRecord::Small(order)
                }
            }
            PayloadSize::Large => {
                let order = large_order(header, &mut rng);
                if generic {
                    BenchRecord::Generic(large_to_generic(&order))
                } else {
                    BenchRecord::Large(Box::new(order))
                }
            }
        }
    }

    /// Overwrite the sequence number and send timestamp in place. The
    /// timestamp buffer is reused, so no part of the template is rebuilt.
    pub fn stamp_header(&self, record: &mut BenchRecord, sequence: u64, iso_timestamp: &str) {
        match record {
            BenchRecord::Small(r) => stamp(&mut r.header, sequence, iso_timestamp),
            BenchRecord::Large(r) => stamp(&mut r.header, sequence, iso_timestamp),
            BenchRecord::Generic(r) => {
                if let Some(FieldValue::Record(header)) = r.get_mut("header") {
                    if let Some(FieldValue::Long(seq)) = header.get_mut("sequence") {
                        *seq = sequence as i64;
                    }
                    if let Some(FieldValue::Str(sent_at)) = header.get_mut("sentAt") {
                        sent_at.clear();
                        sent_at.push_str(iso_timestamp);
                    }
                }
            }
        }
    }
}

fn stamp(header: &mut MessageHeader, sequence: u64, iso_timestamp: &str) {
    header.sequence = sequence;
    header.sent_at.clear();
    header.sent_at.push_str(iso_timestamp);
}

fn filler(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

fn small_order(header: MessageHeader, rng: &mut StdRng) -> SmallOrder {
    SmallOrder {
        header,
        order_id: format!("ord-{}", filler(rng, 12)),
        customer_id: format!("cust-{}", filler(rng, 8)),
        amount: rng.gen_range(1.0..5_000.0),
        currency: "EUR".to_string(),
        priority: rng.gen_bool(0.1),
        tags: (0..4).map(|_| filler(rng, 10)).collect(),
    }
}

fn address(rng: &mut StdRng) -> Address {
    Address {
        street: format!("{} {} Street", rng.gen_range(1..999), filler(rng, 10)),
        city: filler(rng, 12),
        region: filler(rng, 8),
        postal_code: format!("{:05}", rng.gen_range(10_000..99_999)),
        country: "DE".to_string(),
    }
}

fn large_order(header: MessageHeader, rng: &mut StdRng) -> LargeOrder {
    let customer = Customer {
        id: format!("cust-{}", filler(rng, 8)),
        name: format!("{} {}", filler(rng, 8), filler(rng, 12)),
        email: format!("{}@example.com", filler(rng, 10).to_lowercase()),
        phone: format!("+49-{}", rng.gen_range(100_000_000u64..999_999_999)),
        loyalty_points: rng.gen_range(0..100_000),
    };
    let shipping = address(rng);
    let billing = address(rng);
    let items = (0..LARGE_LINE_ITEMS)
        .map(|i| LineItem {
            sku: format!("SKU-{:05}-{}", i, filler(rng, 6)),
            description: filler(rng, 64),
            quantity: rng.gen_range(1..20),
            unit_price: rng.gen_range(0.5..900.0),
            discounted: rng.gen_bool(0.25),
        })
        .collect();

    LargeOrder {
        header,
        order_id: format!("ord-{}", filler(rng, 12)),
        customer,
        shipping,
        billing,
        items,
        notes: filler(rng, 512),
    }
}

fn header_to_generic(h: &MessageHeader) -> FieldValue {
    FieldValue::Record(
        GenericRecord::new("MessageHeader")
            .with("sequence", FieldValue::Long(h.sequence as i64))
            .with("sentAt", FieldValue::Str(h.sent_at.clone()))
            .with("source", FieldValue::Str(h.source.clone()))
            .with("schemaVersion", FieldValue::Long(h.schema_version as i64)),
    )
}

fn address_to_generic(a: &Address) -> FieldValue {
    FieldValue::Record(
        GenericRecord::new("Address")
            .with("street", FieldValue::Str(a.street.clone()))
            .with("city", FieldValue::Str(a.city.clone()))
            .with("region", FieldValue::Str(a.region.clone()))
            .with("postalCode", FieldValue::Str(a.postal_code.clone()))
            .with("country", FieldValue::Str(a.country.clone())),
    )
}

fn small_to_generic(o: &SmallOrder) -> GenericRecord {
    GenericRecord::new("SmallOrder")
        .with("header", header_to_generic(&o.header))
        .with("orderId", FieldValue::Str(o.order_id.clone()))
        .with("customerId", FieldValue::Str(o.customer_id.clone()))
        .with("amount", FieldValue::Double(o.amount))
        .with("currency", FieldValue::Str(o.currency.clone()))
        .with("priority", FieldValue::Bool(o.priority))
        .with(
            "tags",
            FieldValue::Array(o.tags.iter().cloned().map(FieldValue::Str).collect()),
        )
}

fn large_to_generic(o: &LargeOrder) -> GenericRecord {
    let customer = GenericRecord::new("Customer")
        .with("id", FieldValue::Str(o.customer.id.clone()))
        .with("name", FieldValue::Str(o.customer.name.clone()))
        .with("email", FieldValue::Str(o.customer.email.clone()))
        .with("phone", FieldValue::Str(o.customer.phone.clone()))
        .with("loyaltyPoints", FieldValue::Long(o.customer.loyalty_points));
    let items = o
        .items
        .iter()
        .map(|item| {
            FieldValue::Record(
                GenericRecord::new("LineItem")
                    .with("sku", FieldValue::Str(item.sku.clone()))
                    .with("description", FieldValue::Str(item.description.clone()))
                    .with("quantity", FieldValue::Long(item.quantity as i64))
                    .with("unitPrice", FieldValue::Double(item.unit_price))
                    .with("discounted", FieldValue::Bool(item.discounted)),
            )
        })
        .collect();

    GenericRecord::new("LargeOrder")
        .with("header", header_to_generic(&o.header))
        .with("orderId", FieldValue::Str(o.order_id.clone()))
        .with("customer", FieldValue::Record(customer))
        .with("shipping", address_to_generic(&o.shipping))
        .with("billing", address_to_generic(&o.billing))
        .with("items", FieldValue::Array(items))
        .with("notes", FieldValue::Str(o.notes.clone()))
        .with("giftWrap", FieldValue::Null)
}
