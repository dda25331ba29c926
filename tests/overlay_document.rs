use serde_json::json;
use thai_text_overlay::overlay::markup::{TextStyle, standalone_svg};
use thai_text_overlay::{Align, LayoutPlan, Rgb, VAlign, layout_text, validate};
use thai_text_overlay::overlay::LayoutInput;

fn centered_plan(text: &str) -> LayoutPlan {
    layout_text(&LayoutInput {
        text,
        x: 100,
        y: 20,
        font_size: 24,
        align: Align::Center,
        valign: VAlign::Top,
        font: None,
    })
}

#[test]
fn standalone_svg_document() {
    let style = TextStyle {
        families: vec!["Sarabun".to_string()],
        fill: Rgb::WHITE,
        stroke: None,
        language: "th".to_string(),
    };
    let plan = centered_plan("สวัสดี\nA&B");
    let svg = standalone_svg(200, 100, Rgb::BLACK, &plan, &style, None);
    insta::assert_snapshot!(svg, @r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="200" height="100" viewBox="0 0 200 100" xml:lang="th"><rect x="0" y="0" width="200" height="100" fill="#000000"/><text x="100" y="20" font-family="'Sarabun', sans-serif" font-size="24" fill="#FFFFFF" text-anchor="middle" dominant-baseline="text-before-edge" xml:space="preserve">สวัสดี</text><text x="100" y="54" font-family="'Sarabun', sans-serif" font-size="24" fill="#FFFFFF" text-anchor="middle" dominant-baseline="text-before-edge" xml:space="preserve">A&amp;B</text></svg>"##);
}

#[test]
fn request_normalization_through_public_api() {
    let body = json!({
        "img_url": "https://picsum.photos/800/600?random=2",
        "text": "สวัสดีครับ\nบรรทัดที่ 2",
        "x": 50,
        "y": "200",
        "font_size": 36.9,
        "font_color": "not-a-color",
        "stroke_width": 99,
        "align": "CENTER",
        "format": "png"
    });
    let request = validate(body.as_object().unwrap()).unwrap();
    assert_eq!((request.x, request.y), (50, 200));
    assert_eq!(request.font_size, 36);
    assert_eq!(request.font_color, Rgb::WHITE);
    assert_eq!(request.stroke_width, 8);
    assert_eq!(request.align, Align::Left);
    assert_eq!(request.format, Some(thai_text_overlay::OutputFormat::Png));

    let plan = request.plan(None);
    let offsets = plan.lines.iter().map(|line| line.y).collect::<Vec<_>>();
    assert_eq!(offsets, vec![200, 246]);
}
