use parley_base::tensor::element_count;
use parley_base::{ElementType, Tensor, TensorBuffer, TensorError};

#[test]
fn test_tensor_new_valid() {
    let tensor = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    assert_eq!(tensor.shape(), &[2, 3]);
    assert_eq!(tensor.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_tensor_new_rejects_short_buffer() {
    let result = Tensor::new(vec![1, 80, 3000], vec![0.0f32; 100]);
    assert_eq!(
        result,
        Err(TensorError::ShapeMismatch {
            expected: 240_000,
            got: 100
        })
    );
}

#[test]
fn test_tensor_new_overflow() {
    let result = Tensor::<f32>::new(vec![usize::MAX, 2], vec![]);
    assert!(matches!(result, Err(TensorError::ShapeOverflow)));
}

#[test]
fn test_element_count_scalar_shape() {
    assert_eq!(element_count(&[]), Ok(1));
    assert_eq!(element_count(&[4, 0, 2]), Ok(0));
}

#[test]
fn test_tensor_zeros() {
    let tensor = Tensor::<i32>::zeros(vec![1, 4]).unwrap();
    assert_eq!(tensor.data(), &[0, 0, 0, 0]);
    assert_eq!(tensor.ndim(), 2);
    assert!(!tensor.is_empty());
}

#[test]
fn test_into_data_returns_elements() {
    let tensor = Tensor::new(vec![3], vec![7, 8, 9]).unwrap();
    assert_eq!(tensor.into_data(), vec![7, 8, 9]);
}

#[test]
fn test_buffer_from_ids_int32() {
    let buffer = TensorBuffer::from_ids(ElementType::I32, vec![1, 3], &[5, 6, 7]).unwrap();
    assert_eq!(buffer.element_type(), ElementType::I32);
    assert_eq!(buffer.shape(), &[1, 3]);
    assert_eq!(buffer.to_ids().unwrap(), vec![5, 6, 7]);
}

#[test]
fn test_buffer_from_ids_int64_widens() {
    let buffer = TensorBuffer::from_ids(ElementType::I64, vec![1, 2], &[1, -1]).unwrap();
    match &buffer {
        TensorBuffer::I64(t) => assert_eq!(t.data(), &[1i64, -1]),
        other => panic!("expected int64 buffer, got {:?}", other.element_type()),
    }
    assert_eq!(buffer.to_ids().unwrap(), vec![1, -1]);
}

#[test]
fn test_buffer_from_ids_rejects_float() {
    let result = TensorBuffer::from_ids(ElementType::F32, vec![1], &[1]);
    assert!(matches!(
        result,
        Err(TensorError::ElementTypeMismatch { .. })
    ));
}

#[test]
fn test_buffer_as_f32_type_checked() {
    let logits = TensorBuffer::from(Tensor::new(vec![2], vec![0.5f32, 1.5]).unwrap());
    assert_eq!(logits.as_f32().unwrap(), &[0.5, 1.5]);
    assert!(logits.to_ids().is_err());

    let ids = TensorBuffer::from(Tensor::new(vec![1], vec![3i32]).unwrap());
    assert_eq!(
        ids.as_f32(),
        Err(TensorError::ElementTypeMismatch {
            expected: ElementType::F32,
            got: ElementType::I32
        })
    );
}

#[test]
fn test_buffer_zeros_matches_type() {
    let buffer = TensorBuffer::zeros(ElementType::F32, vec![2, 2]).unwrap();
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.element_type(), ElementType::F32);
}

#[test]
fn test_error_display() {
    let err = TensorError::ElementTypeMismatch {
        expected: ElementType::F32,
        got: ElementType::I64,
    };
    assert_eq!(
        err.to_string(),
        "element type mismatch: expected float32, got int64"
    );
}
