//! Varint Codec Property Tests

use opencoder::{
    decode_varint_signed, encode_varint_signed, skip_varint_signed, OpNum, Operand, Trace,
    MAX_VALUE, MIN_VALUE, SMALL_INT_START, SMALL_INT_STOP,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    // Property: any value in range decodes back after an arbitrary prefix.
    #[test]
    fn varint_roundtrip(value in MIN_VALUE..=MAX_VALUE, prefix in proptest::collection::vec(any::<u8>(), 0..16)) {
        let mut encoded = Vec::new();
        let written = encode_varint_signed(value, &mut encoded).unwrap();
        prop_assert_eq!(written, encoded.len());
        prop_assert_eq!(decode_varint_signed(&encoded, 0).unwrap(), (value, encoded.len()));

        let mut buf = prefix.clone();
        buf.extend_from_slice(&encoded);
        prop_assert_eq!(
            decode_varint_signed(&buf, prefix.len()).unwrap(),
            (value, prefix.len() + encoded.len())
        );
        prop_assert_eq!(skip_varint_signed(&buf, prefix.len()).unwrap(), buf.len());
    }

    // Property: values outside the range are rejected without writing.
    #[test]
    fn varint_out_of_range(value in prop_oneof![i64::MIN..MIN_VALUE, (MAX_VALUE + 1)..=i64::MAX]) {
        let mut buf = Vec::new();
        prop_assert!(encode_varint_signed(value, &mut buf).is_err());
        prop_assert!(buf.is_empty());
    }

    // Property: small integer constants are stored inline, in 2 bytes
    // when they fit 13 bits and 4 bytes otherwise.
    #[test]
    fn small_int_inline(num in SMALL_INT_START..SMALL_INT_STOP) {
        let mut trace = Trace::new(&[]);
        trace.record_op(OpNum::SameAsI, &[Operand::int(num)], None).unwrap();
        prop_assert_eq!(trace.num_bigints(), 0);
        let expected = if (-(1 << 12)..(1 << 12)).contains(&num) { 2 } else { 4 };
        prop_assert_eq!(trace.length(), 1 + expected);
        let op = trace.get_iter().next().unwrap().unwrap();
        prop_assert_eq!(op.getarg(0).getint(), Some(num));
    }
}
