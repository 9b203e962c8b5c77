use cornermatch::image::{IntegralImage, WindowSums};
use cornermatch::{CornerMatchError, ErrorKind, FeatureDescriptor, Image, ImageView, PatchData};

#[test]
fn image_view_rejects_invalid_dimensions() {
    let data = [0u8; 4];

    let err = ImageView::from_slice(&data, 0, 1).err().unwrap();
    assert_eq!(
        err,
        CornerMatchError::InvalidDimensions {
            width: 0,
            height: 1,
        }
    );

    let err = ImageView::from_slice(&data, 3, 2).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn image_view_rejects_invalid_stride() {
    let data = [0u8; 8];

    let err = ImageView::new(&data, 4, 1, 3).err().unwrap();
    assert_eq!(
        err,
        CornerMatchError::InvalidStride {
            width: 4,
            stride: 3,
        }
    );
}

#[test]
fn extend_replicates_edges() {
    let img = Image::new(vec![1, 2, 3, 4, 5, 6], 3, 2).unwrap();
    let ext = img.extend(2).unwrap();
    assert_eq!((ext.width(), ext.height()), (7, 6));
    // corners replicate the nearest corner pixel
    assert_eq!(ext.get(0, 0), Some(1));
    assert_eq!(ext.get(5, 6), Some(6));
    // interior is the source shifted by the border
    assert_eq!(ext.get(2, 3), Some(2));
    assert_eq!(ext.get(3, 4), Some(6));
    // top padding copies the first row
    assert_eq!(ext.get(0, 4), Some(3));
}

#[test]
fn integral_sums_match_direct_sums() {
    let width = 23;
    let height = 17;
    let pixels: Vec<u8> = (0..width * height)
        .map(|i| ((i * 37 + i / 5) % 256) as u8)
        .collect();
    let img = Image::new(pixels, width, height).unwrap();
    let integral = IntegralImage::build(img.view()).unwrap();

    for (row, col, size) in [(0, 0, 5), (3, 4, 8), (9, 7, 8), (1, 15, 8)] {
        let window = img.view().window(row, col, size, size).unwrap();
        assert_eq!(
            integral.window_sums(row, col, size),
            Some(WindowSums::direct(window))
        );
    }
    assert_eq!(integral.window_sums(12, 0, 8), None);
}

#[test]
fn uniform_descriptor_is_homogeneous() {
    let descriptor = FeatureDescriptor::uniform(128, 4, 4);
    let stats = PatchData::<f32>::compute(descriptor.view()).unwrap();
    assert!(stats.is_homogeneous());

    let window = Image::filled(16, 16, 128).unwrap();
    let sums = WindowSums::direct(window.view());
    assert_eq!(stats.score(window.view(), sums), 0.0);
}

#[test]
fn error_kinds_classify_failures() {
    assert_eq!(
        CornerMatchError::PoolExhausted {
            requested: 10,
            available: 0
        }
        .kind(),
        ErrorKind::Allocation
    );
    assert_eq!(
        CornerMatchError::RemoteFailure { opcode: 3 }.kind(),
        ErrorKind::Protocol
    );
    assert_eq!(CornerMatchError::MissingImageData.kind(), ErrorKind::Misuse);
}
