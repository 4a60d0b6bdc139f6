use std::fmt;
use std::iter::Enumerate;
use std::slice;
use std::vec;

/// Elements that occupy a variable number of index positions
pub trait Width {
    fn width(&self) -> usize;
}

/// Position in an [`OffsetVec`], counted in widths rather than elements
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Vector whose elements are addressed by the running sum of the widths before them
///
/// This is the shape of the constant pool (where `long` and `double` take two indices, and
/// indexing starts at 1), of operand stacks (where depth is counted in slots), and of local
/// variable arrays in stack map frames.
#[derive(Clone)]
pub struct OffsetVec<T> {
    entries: Vec<(Offset, T)>,
    next_offset: Offset,
    first_offset: Offset,
}

/// Outcome of looking an element up by offset
pub enum OffsetResult<'a, T> {
    /// Element index and element
    Ok(usize, &'a T),

    /// Offset lands inside the element at this index
    InvalidOffset(usize),

    /// Offset is at or past the end
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            _ => None,
        }
    }
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    pub fn new_starting_at(first_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next_offset: first_offset,
            first_offset,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next pushed element will get
    pub fn offset_len(&self) -> Offset {
        self.next_offset
    }

    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Remove the last element, returning its offset, index, and value
    pub fn pop(&mut self) -> Option<(Offset, usize, T)> {
        let (offset, elem) = self.entries.pop()?;
        self.next_offset = offset;
        Some((offset, self.entries.len(), elem))
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.last().map(|(_, elem)| elem)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_offset = self.first_offset;
    }

    /// Find the element starting at `offset`
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<T> {
        match self.entries.binary_search_by_key(&offset, |(start, _)| *start) {
            Ok(idx) => OffsetResult::Ok(idx, &self.entries[idx].1),
            Err(idx) if idx == self.entries.len() => OffsetResult::TooLarge,
            Err(idx) => OffsetResult::InvalidOffset(idx),
        }
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.into_iter()
    }
}

impl<T: PartialEq> PartialEq for OffsetVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for OffsetVec<T> {}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

/// Owning iterator yielding `(offset, index, element)`
pub struct IntoIter<T>(Enumerate<vec::IntoIter<(Offset, T)>>);

impl<T> Iterator for IntoIter<T> {
    type Item = (Offset, usize, T);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, (offset, elem)) = self.0.next()?;
        Some((offset, idx, elem))
    }
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = (Offset, usize, T);
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter(self.entries.into_iter().enumerate())
    }
}

/// Borrowing iterator yielding `(offset, index, element)`
pub struct Iter<'a, T>(Enumerate<slice::Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, (offset, elem)) = self.0.next()?;
        Some((*offset, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        Iter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elems: I) -> Self {
        let mut offset_vec = OffsetVec::new();
        offset_vec.extend(elems);
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, elems: I) {
        for elem in elems {
            self.push(elem);
        }
    }
}

impl<T: Width> From<Vec<T>> for OffsetVec<T> {
    fn from(elems: Vec<T>) -> Self {
        elems.into_iter().collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(offset, elem)| format!("#{} = {:?}", offset.0, elem)),
            )
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_follow_widths() {
        let slots: OffsetVec<Slot> = vec![Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)].into();
        assert_eq!(slots.offset_len(), Offset(4));
        assert_eq!(slots.len(), 3);
        assert_eq!(
            slots.into_iter().collect::<Vec<_>>(),
            vec![
                (Offset(0), 0, Slot::Narrow(1)),
                (Offset(1), 1, Slot::Wide(2)),
                (Offset(3), 2, Slot::Narrow(3)),
            ]
        );
    }

    #[test]
    fn pool_style_lookup() {
        let mut pool: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(1));
        pool.push(Slot::Wide(7));
        pool.push(Slot::Narrow(8));
        assert_eq!(pool.get_offset(Offset(1)).ok(), Some(&Slot::Wide(7)));
        assert!(matches!(pool.get_offset(Offset(2)), OffsetResult::InvalidOffset(1)));
        assert_eq!(pool.get_offset(Offset(3)).ok(), Some(&Slot::Narrow(8)));
        assert!(matches!(pool.get_offset(Offset(4)), OffsetResult::TooLarge));
        assert_eq!(format!("{:?}", pool), "[\"#1 = Wide(7)\", \"#3 = Narrow(8)\"]");
    }

    #[test]
    fn popping_restores_offset() {
        let mut stack: OffsetVec<Slot> = OffsetVec::new();
        stack.push(Slot::Narrow(0));
        stack.push(Slot::Wide(1));
        assert_eq!(stack.pop(), Some((Offset(1), 1, Slot::Wide(1))));
        assert_eq!(stack.offset_len(), Offset(1));
        assert_eq!(stack.last(), Some(&Slot::Narrow(0)));
        stack.clear();
        assert_eq!(stack.offset_len(), Offset(0));
        assert!(stack.pop().is_none());
    }
}
