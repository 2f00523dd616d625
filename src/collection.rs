use std::mem;

use bytemuck::{Pod, Zeroable};

use crate::{
    error::HeapError,
    heap::{Heap, HeapPtr},
};

/// Node of a [`HeapList`] as stored in a heap block. Links are the offsets
/// of other nodes, 0 meaning there's none.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Node {
    value: u64,
    next: u64,
    prev: u64,
}

const NODE_SIZE: usize = mem::size_of::<Node>();

fn link(ptr: Option<HeapPtr>) -> u64 {
    ptr.map_or(0, |ptr| ptr.offset() as u64)
}

fn unlink(raw: u64) -> Option<HeapPtr> {
    usize::try_from(raw).ok().and_then(HeapPtr::from_offset)
}

fn read_node<S>(heap: &Heap<S>, ptr: HeapPtr) -> Result<Node, HeapError>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    let bytes = heap.bytes(ptr)?;
    let bytes = bytes.get(..NODE_SIZE).ok_or(HeapError::InvalidPointer {
        offset: ptr.offset(),
    })?;

    Ok(bytemuck::pod_read_unaligned(bytes))
}

fn write_node<S: AsRef<[u8]> + AsMut<[u8]>>(
    heap: &mut Heap<S>,
    ptr: HeapPtr,
    node: Node,
) -> Result<(), HeapError> {
    let bytes = heap.bytes_mut(ptr)?;
    let bytes = bytes.get_mut(..NODE_SIZE).ok_or(HeapError::InvalidPointer {
        offset: ptr.offset(),
    })?;

    bytes.copy_from_slice(bytemuck::bytes_of(&node));
    Ok(())
}

/// Doubly linked list of integers whose nodes live in a [`Heap`]. The list
/// itself only remembers where its ends are, so every operation takes the
/// heap that holds the nodes. Using a list with a different heap than the
/// one it was built in is an error.
///
/// ```text
///            +------+    +------+    +------+
/// head ----> | Node | -> | Node | -> | Node | <---- tail
///            |      | <- |      | <- |      |
///            +------+    +------+    +------+
/// ```
///
/// # Examples
///
/// ```rust
/// use nextfit::{Heap, HeapList};
///
/// let mut heap = Heap::new(vec![0u8; 1024]);
/// let mut list = HeapList::new();
///
/// list.push_back(&mut heap, 1).unwrap();
/// list.push_back(&mut heap, 2).unwrap();
/// assert_eq!(list.pop_back(&mut heap), Ok(Some(2)));
///
/// let values: Result<Vec<_>, _> = list.values(&heap).collect();
/// assert_eq!(values, Ok(vec![1]));
///
/// list.clear(&mut heap).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct HeapList {
    head: Option<HeapPtr>,
    tail: Option<HeapPtr>,
    len: usize,
}

impl HeapList {
    /// Creates an empty list. Nothing is allocated until the first push.
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocates a node for `value` and appends it at the end of the list.
    /// If the allocation fails the list is left as it was.
    pub fn push_back<S: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        heap: &mut Heap<S>,
        value: u64,
    ) -> Result<HeapPtr, HeapError> {
        let ptr = heap.allocate(NODE_SIZE)?;

        let node = Node {
            value,
            next: 0,
            prev: link(self.tail),
        };
        write_node(heap, ptr, node)?;

        if let Some(tail) = self.tail {
            let mut tail_node = read_node(heap, tail)?;
            tail_node.next = link(Some(ptr));
            write_node(heap, tail, tail_node)?;
        } else {
            self.head = Some(ptr);
        }

        self.tail = Some(ptr);
        self.len += 1;

        Ok(ptr)
    }

    /// Removes the last node, releases its block and returns its value.
    pub fn pop_back<S: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        heap: &mut Heap<S>,
    ) -> Result<Option<u64>, HeapError> {
        let Some(tail) = self.tail else {
            return Ok(None);
        };

        let node = read_node(heap, tail)?;

        match unlink(node.prev) {
            Some(prev) => {
                let mut prev_node = read_node(heap, prev)?;
                prev_node.next = 0;
                write_node(heap, prev, prev_node)?;
                self.tail = Some(prev);
            }
            None => {
                self.head = None;
                self.tail = None;
            }
        }

        heap.try_release(tail)?;
        self.len -= 1;

        Ok(Some(node.value))
    }

    /// Iterates over the values from head to tail.
    pub fn values<'h, S>(&self, heap: &'h Heap<S>) -> Values<'h, S>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        Values {
            heap,
            next: self.head,
            remaining: self.len,
        }
    }

    /// Releases every node, leaving the list empty.
    pub fn clear<S>(&mut self, heap: &mut Heap<S>) -> Result<(), HeapError>
    where
        S: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut current = self.head;

        while let Some(ptr) = current {
            current = unlink(read_node(heap, ptr)?.next);
            heap.try_release(ptr)?;
            self.head = current;
            self.len -= 1;
        }

        self.tail = None;

        Ok(())
    }
}

/// Iterator returned by [`HeapList::values`].
pub struct Values<'h, S> {
    heap: &'h Heap<S>,
    next: Option<HeapPtr>,
    remaining: usize,
}

impl<'h, S: AsRef<[u8]> + AsMut<[u8]>> Iterator for Values<'h, S> {
    type Item = Result<u64, HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        let ptr = self.next.take()?;

        // Never follow more links than there are nodes, whatever the heap
        // contains.
        self.remaining = self.remaining.checked_sub(1)?;

        match read_node(self.heap, ptr) {
            Ok(node) => {
                self.next = unlink(node.next);
                Some(Ok(node.value))
            }
            Err(error) => Some(Err(error)),
        }
    }
}
