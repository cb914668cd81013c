use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// SPSC ring buffer between the capture side and the data callback.
///
/// The producer and consumer handles must be moved to their respective
/// threads; all operations are lock-free.
pub(crate) struct RingBufferProducer<T> {
    inner: HeapProd<T>,
}

pub(crate) struct RingBufferConsumer<T> {
    inner: HeapCons<T>,
}

pub(crate) fn new_ring_buffer<T>(
    capacity: usize,
) -> (RingBufferProducer<T>, RingBufferConsumer<T>) {
    let rb = HeapRb::<T>::new(capacity);
    let (producer, consumer) = rb.split();
    (
        RingBufferProducer { inner: producer },
        RingBufferConsumer { inner: consumer },
    )
}

impl<T> RingBufferProducer<T> {
    pub(crate) fn push_slice(&mut self, items: &[T]) -> usize
    where
        T: Copy,
    {
        self.inner.push_slice(items)
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.inner.occupied_len()
    }
}

impl<T> RingBufferConsumer<T> {
    pub(crate) fn pop_slice(&mut self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        self.inner.pop_slice(out)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_preserves_order() {
        let (mut prod, mut cons) = new_ring_buffer::<f32>(8);
        assert_eq!(prod.push_slice(&[1.0, 2.0, 3.0]), 3);
        let mut out = [0.0f32; 2];
        assert_eq!(cons.pop_slice(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(cons.len(), 1);
    }

    #[test]
    fn push_beyond_capacity_is_partial() {
        let (mut prod, _cons) = new_ring_buffer::<f32>(4);
        assert_eq!(prod.push_slice(&[0.0; 6]), 4);
    }
}
