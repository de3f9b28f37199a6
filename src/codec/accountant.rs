//! Byte-counting decoder wrapper.

use super::{CodecError, ValueDecoder};
use crate::payload::BenchRecord;
use std::sync::atomic::{AtomicU64, Ordering};

/// Wraps a decoder and counts every raw byte handed to it, decodable or not.
///
/// The counter is atomic because the broker client may decode on its own
/// threads while the runner reads the running total.
pub struct ByteAccountant<D> {
    inner: D,
    bytes: AtomicU64,
}

impl<D: ValueDecoder> ByteAccountant<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            bytes: AtomicU64::new(0),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
    }
}

impl<D: ValueDecoder> ValueDecoder for ByteAccountant<D> {
    fn decode(&self, bytes: &[u8]) -> Result<BenchRecord, CodecError> {
        self.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.inner.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Subject, ValueDeserializer, ValueSerializer};
    use crate::payload::DataFactory;
    use crate::scenario::{Format, PayloadSize, RecordType};
    use std::sync::Arc;

    #[test]
    fn counts_failed_and_successful_decodes() {
        let subject = Subject::new(Format::Binary, PayloadSize::Small, RecordType::Generic);
        let accountant = ByteAccountant::new(ValueDeserializer::new(subject));

        let template = DataFactory::new(subject.format, subject.size, subject.record_type)
            .build_template();
        let frame = ValueSerializer::new(subject).encode(&template).unwrap();

        accountant.decode(&frame).unwrap();
        assert!(accountant.decode(&[1, 2, 3]).is_err());
        assert_eq!(accountant.total_bytes(), frame.len() as u64 + 3);

        accountant.reset();
        assert_eq!(accountant.total_bytes(), 0);
    }

    #[test]
    fn concurrent_decodes_sum_exactly() {
        let subject = Subject::new(Format::Text, PayloadSize::Small, RecordType::NotApplicable);
        let accountant = Arc::new(ByteAccountant::new(ValueDeserializer::new(subject)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let acc = Arc::clone(&accountant);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let _ = acc.decode(&[0u8; 10]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(accountant.total_bytes(), 4 * 1000 * 10);
    }
}
