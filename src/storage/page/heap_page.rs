use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::common::{PageId, RecordId, Result, ShaleError, SlotId, TransactionId, PAGE_SIZE};
use crate::tuple::{Schema, Tuple};

/// Heap page layout for a table whose tuples are `w` bytes wide:
///
/// +------------------+
/// | Slot Bitmap      |  (ceil(num_slots / 8) bytes)
/// +------------------+
/// | [slot 0]         |  (w bytes each)
/// | [slot 1]         |
/// | ...              |
/// | [slot n-1]       |
/// +------------------+
/// | Zero Padding     |
/// +------------------+
///
/// `num_slots = floor(PAGE_SIZE * 8 / (w * 8 + 1))`: every slot costs its
/// tuple bytes plus one bitmap bit. Bit `i % 8` of bitmap byte `i / 8`
/// (least significant first) is set while slot `i` holds a tuple.
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    num_slots: usize,
    header_size: usize,
    data: BytesMut,
    /// Transaction that last modified this page since it was read or flushed
    dirtier: Option<TransactionId>,
}

/// Number of slots a page can hold for tuples of `tuple_size` bytes.
pub fn slots_per_page(tuple_size: usize) -> usize {
    (PAGE_SIZE * 8) / (tuple_size * 8 + 1)
}

impl HeapPage {
    /// Creates a page with every slot free.
    pub fn new_empty(page_id: PageId, schema: Arc<Schema>) -> Result<Self> {
        Self::from_bytes(page_id, schema, &[0u8; PAGE_SIZE])
    }

    /// Decodes a page image read from disk.
    pub fn from_bytes(page_id: PageId, schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let num_slots = slots_per_page(schema.tuple_size());
        if num_slots == 0 {
            return Err(ShaleError::TupleTooLarge {
                tuple_size: schema.tuple_size(),
            });
        }

        Ok(Self {
            page_id,
            schema,
            num_slots,
            header_size: num_slots.div_ceil(8),
            data: BytesMut::from(data),
            dirtier: None,
        })
    }

    /// Returns a copy of the full page image for writing to disk.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// Returns whether slot `slot` holds a tuple. Out-of-range slots are unused.
    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.data[slot / 8] |= 1 << (slot % 8);
        } else {
            self.data[slot / 8] &= !(1 << (slot % 8));
        }
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let width = self.schema.tuple_size();
        let start = self.header_size + slot * width;
        start..start + width
    }

    /// Places `tuple` in the first free slot and records its new `RecordId` on it.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if !Arc::ptr_eq(tuple.schema(), &self.schema) && **tuple.schema() != *self.schema {
            return Err(ShaleError::SchemaMismatch(format!(
                "tuple does not match the schema of {}",
                self.page_id
            )));
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or(ShaleError::PageFull(self.page_id))?;

        let range = self.slot_range(slot);
        tuple.write_to(&mut self.data[range])?;
        self.set_slot_used(slot, true);

        let record_id = RecordId::new(self.page_id, SlotId::new(slot as u16));
        tuple.set_record_id(Some(record_id));
        Ok(record_id)
    }

    /// Frees the slot addressed by the tuple's `RecordId`. Slot bytes are left as is.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(ShaleError::MissingRecordId)?;
        if record_id.page_id != self.page_id {
            return Err(ShaleError::RecordNotOnPage {
                record_id,
                page_id: self.page_id,
            });
        }

        let slot = record_id.slot_id.as_usize();
        if slot >= self.num_slots {
            return Err(ShaleError::InvalidSlotId(record_id.slot_id.as_u16()));
        }
        if !self.is_slot_used(slot) {
            return Err(ShaleError::EmptySlot(record_id.slot_id.as_u16()));
        }

        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Decodes the tuple stored in `slot`.
    pub fn tuple(&self, slot: usize) -> Result<Tuple> {
        if slot >= self.num_slots {
            return Err(ShaleError::InvalidSlotId(slot as u16));
        }
        if !self.is_slot_used(slot) {
            return Err(ShaleError::EmptySlot(slot as u16));
        }

        let bytes = &self.data[self.slot_range(slot)];
        let mut tuple = Tuple::from_bytes(Arc::clone(&self.schema), bytes)?;
        tuple.set_record_id(Some(RecordId::new(self.page_id, SlotId::new(slot as u16))));
        Ok(tuple)
    }

    /// Decodes every stored tuple in slot order.
    pub fn tuples(&self) -> Result<Vec<Tuple>> {
        (0..self.num_slots)
            .filter(|&i| self.is_slot_used(i))
            .map(|i| self.tuple(i))
            .collect()
    }

    /// Sets or clears the dirty marker. `None` means the page matches disk.
    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtier = dirtier;
    }

    /// Returns the transaction that dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }
}

impl std::fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPage")
            .field("page_id", &self.page_id)
            .field("num_slots", &self.num_slots)
            .field("used", &(self.num_slots - self.num_empty_slots()))
            .field("dirtier", &self.dirtier)
            .finish()
    }
}
